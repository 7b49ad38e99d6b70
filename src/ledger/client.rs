//! Client interface to a registry ledger
//!
//! Submission and confirmation are separate steps. A failed `submit` means
//! the transaction never reached the chain and may be retried; a failed
//! `wait_for_receipt` means it may or may not land, so the attempt is over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::Role;
use crate::ledger::contract::{ContractCall, Revert};
use crate::model::{Parcel, Transfer};
use crate::types::Result;

/// Hex-encoded SHA-256 transaction hash
pub type TxHash = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Confirmed,
    Reverted(Revert),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_height: u64,
    pub status: ReceiptStatus,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Send a call to the chain. Errors are `Storage` and retryable.
    async fn submit(&self, sender: &str, call: ContractCall) -> Result<TxHash>;

    /// Wait until the transaction is `confirmations` blocks deep.
    /// Fails with `NotConfirmed` once `timeout` elapses.
    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Receipt>;

    async fn parcel(&self, parcel_id: &str) -> Result<Option<Parcel>>;

    async fn parcels(&self) -> Result<Vec<Parcel>>;

    async fn transfer(&self, transfer_id: &str) -> Result<Option<Transfer>>;

    async fn pending_transfer(&self, parcel_id: &str) -> Result<Option<Transfer>>;

    /// All transfers in recording order
    async fn transfers(&self) -> Result<Vec<Transfer>>;

    async fn has_role(&self, account: &str, role: Role) -> Result<bool>;
}
