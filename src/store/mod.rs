//! Storage abstraction for parcels and transfers
//!
//! The workflow engine only talks to these traits. Each backend (memory,
//! MongoDB, ledger) must honour the same contract:
//!
//! - `get_parcel` never returns a soft-deleted parcel, but a deleted id can
//!   never be registered again.
//! - A parcel write carries the version it was derived from and fails with
//!   `Conflict` when the stored version moved on.
//! - A [`Transition`] writes a parcel and a transfer as one unit: either both
//!   land or neither does.
//! - At most one open transfer exists per parcel, enforced by the backend
//!   independently of the version check.

pub mod memory;

use async_trait::async_trait;

use crate::auth::Action;
use crate::model::{Parcel, ParcelQuery, Transfer, TransferStatus};
use crate::types::{RegistryError, Result};

pub use memory::InMemoryStore;

/// A write touching only the parcel record
#[derive(Debug, Clone)]
pub struct ParcelChange {
    /// Identity performing the write
    pub actor: String,
    pub action: Action,
    pub parcel: Parcel,
    /// `None` registers a new parcel
    pub expected_version: Option<i64>,
}

/// An atomic write of a parcel together with one of its transfers
#[derive(Debug, Clone)]
pub struct Transition {
    pub actor: String,
    pub action: Action,
    pub parcel: Parcel,
    pub expected_parcel_version: i64,
    pub transfer: Transfer,
    /// Status the stored transfer must still have; `None` inserts it
    pub expected_transfer_status: Option<TransferStatus>,
}

impl Transition {
    /// Derived fields are recomputed before anything is persisted
    pub fn normalize(&mut self) {
        self.transfer.fees.recompute();
    }

    /// Parcel status must agree with whether the transfer is still open
    pub fn check_consistency(&self) -> Result<()> {
        if self.parcel.parcel_id != self.transfer.parcel_id {
            return Err(RegistryError::Internal(format!(
                "Transition mixes parcel {} with transfer for {}",
                self.parcel.parcel_id, self.transfer.parcel_id
            )));
        }
        let under_transfer = self.parcel.status == crate::model::ParcelStatus::UnderTransfer;
        if under_transfer != self.transfer.status.is_open() {
            return Err(RegistryError::Internal(format!(
                "Parcel status {} inconsistent with transfer status {}",
                self.parcel.status, self.transfer.status
            )));
        }
        Ok(())
    }
}

pub(crate) fn version_conflict(parcel_id: &str) -> RegistryError {
    RegistryError::Conflict(format!("Parcel {} was modified concurrently", parcel_id))
}

pub(crate) fn open_transfer_conflict(parcel_id: &str) -> RegistryError {
    RegistryError::Conflict(format!(
        "Parcel {} already has a transfer in progress",
        parcel_id
    ))
}

#[async_trait]
pub trait ParcelStore: Send + Sync {
    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>>;

    /// Verified, active parcels matching `query`, newest first
    async fn search_parcels(&self, query: &ParcelQuery, limit: usize) -> Result<Vec<Parcel>>;

    async fn save_parcel(&self, change: ParcelChange) -> Result<()>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>>;

    /// The single non-terminal transfer of a parcel, if any
    async fn open_transfer_for(&self, parcel_id: &str) -> Result<Option<Transfer>>;

    /// All transfers of a parcel, oldest first
    async fn transfers_for_parcel(&self, parcel_id: &str) -> Result<Vec<Transfer>>;

    /// Transfers where `identity` is a party, newest first
    async fn transfers_involving(&self, identity: &str) -> Result<Vec<Transfer>>;

    /// Transfers in `status`, oldest first
    async fn transfers_with_status(&self, status: TransferStatus) -> Result<Vec<Transfer>>;
}

#[async_trait]
pub trait RegistryStore: ParcelStore + TransferStore {
    /// Short backend name for logs and the health endpoint
    fn backend_name(&self) -> &'static str;

    async fn commit(&self, transition: Transition) -> Result<()>;
}
