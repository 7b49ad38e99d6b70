//! MongoDB persistence
//!
//! Provides the client wrapper, document schemas and the [`MongoStore`]
//! backend.

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{MongoClient, MongoCollection};
pub use store::MongoStore;
