//! Database schemas for the registry
//!
//! Defines MongoDB document structures for parcels and transfers.

mod metadata;
mod parcel;
mod transfer;

pub use metadata::Metadata;
pub use parcel::{ParcelDoc, PARCEL_COLLECTION};
pub use transfer::{TransferDoc, TRANSFER_COLLECTION};
