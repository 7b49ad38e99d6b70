//! Shared types

mod error;

pub use error::{RegistryError, Result};
