//! Ledger backend
//!
//! The registry contract, a client trait for talking to a chain, an
//! in-process chain for development and tests, and the store adapter that
//! lets the workflow engine run on top of it unchanged.

pub mod chain;
pub mod client;
pub mod contract;
pub mod store;

pub use chain::InMemoryLedger;
pub use client::{LedgerClient, Receipt, ReceiptStatus, TxHash};
pub use contract::{ContractCall, RegistryContract, Revert, RevertKind};
pub use store::LedgerStore;
