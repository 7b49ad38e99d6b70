//! Land registry
//!
//! Parcel records plus the transfer workflow that moves ownership between
//! parties once a registry official approves.
//!
//! ## Components
//!
//! - **Parcel registry**: registration, search, verification, documents
//! - **Transfer engine**: the state machine coupling `Parcel.status` to
//!   the single open `Transfer` of a parcel
//! - **History**: ownership timeline rebuilt from completed transfers
//! - **Stores**: in-memory, MongoDB (multi-document transactions), or a
//!   registry contract on a ledger

pub mod auth;
pub mod config;
pub mod db;
pub mod ledger;
pub mod model;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::{Args, Backend};
pub use server::{run, AppState};
pub use types::{RegistryError, Result};
