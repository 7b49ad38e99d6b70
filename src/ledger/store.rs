//! Registry store backed by a ledger client
//!
//! Every write becomes one contract call, so a transition is atomic by
//! construction: the contract either applies both records or reverts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::Role;
use crate::ledger::client::{LedgerClient, ReceiptStatus, TxHash};
use crate::ledger::contract::ContractCall;
use crate::model::{Parcel, ParcelQuery, Transfer, TransferStatus};
use crate::store::{ParcelChange, ParcelStore, RegistryStore, TransferStore, Transition};
use crate::types::{RegistryError, Result};

pub struct LedgerStore<C: LedgerClient> {
    client: Arc<C>,
    confirmations: u64,
    receipt_timeout: Duration,
}

impl<C: LedgerClient> LedgerStore<C> {
    pub fn new(client: Arc<C>, confirmations: u64, receipt_timeout: Duration) -> Self {
        Self {
            client,
            confirmations,
            receipt_timeout,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Grant an on-chain role; `admin` must hold the admin role
    pub async fn grant_role(&self, admin: &str, account: &str, role: Role) -> Result<TxHash> {
        let tx = self
            .execute(
                admin,
                ContractCall::GrantRole {
                    account: account.to_string(),
                    role,
                },
            )
            .await?;
        info!(account, role = %role, tx = %tx, "Ledger role granted");
        Ok(tx)
    }

    /// Submit, then wait for the receipt and turn a revert into a typed error
    async fn execute(&self, sender: &str, call: ContractCall) -> Result<TxHash> {
        let method = call.method();
        let tx_hash = self.client.submit(sender, call).await?;

        let receipt = self
            .client
            .wait_for_receipt(&tx_hash, self.confirmations, self.receipt_timeout)
            .await
            .map_err(|e| {
                warn!(tx = %tx_hash, method, error = %e, "Ledger transaction not confirmed");
                e
            })?;

        match receipt.status {
            ReceiptStatus::Confirmed => {
                debug!(tx = %tx_hash, method, height = receipt.block_height, "Ledger transaction confirmed");
                Ok(tx_hash)
            }
            ReceiptStatus::Reverted(revert) => {
                debug!(tx = %tx_hash, method, reason = %revert, "Ledger transaction reverted");
                Err(RegistryError::from(revert))
            }
        }
    }

    async fn transfers_where<F>(&self, keep: F) -> Result<Vec<Transfer>>
    where
        F: Fn(&Transfer) -> bool + Send,
    {
        Ok(self
            .client
            .transfers()
            .await?
            .into_iter()
            .filter(|t| keep(t))
            .collect())
    }
}

#[async_trait]
impl<C: LedgerClient + 'static> ParcelStore for LedgerStore<C> {
    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>> {
        Ok(self.client.parcel(parcel_id).await?.filter(|p| !p.deleted))
    }

    async fn search_parcels(&self, query: &ParcelQuery, limit: usize) -> Result<Vec<Parcel>> {
        let mut found: Vec<Parcel> = self
            .client
            .parcels()
            .await?
            .into_iter()
            .filter(|p| query.matches(p))
            .collect();
        found.sort_by(|a, b| {
            b.registered_at
                .cmp(&a.registered_at)
                .then_with(|| a.parcel_id.cmp(&b.parcel_id))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn save_parcel(&self, change: ParcelChange) -> Result<()> {
        let call = match change.expected_version {
            None => ContractCall::RegisterParcel {
                parcel: change.parcel,
            },
            Some(expected_version) => ContractCall::UpdateParcel {
                action: change.action,
                parcel: change.parcel,
                expected_version,
            },
        };
        self.execute(&change.actor, call).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: LedgerClient + 'static> TransferStore for LedgerStore<C> {
    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        self.client.transfer(transfer_id).await
    }

    async fn open_transfer_for(&self, parcel_id: &str) -> Result<Option<Transfer>> {
        self.client.pending_transfer(parcel_id).await
    }

    async fn transfers_for_parcel(&self, parcel_id: &str) -> Result<Vec<Transfer>> {
        let mut found = self.transfers_where(|t| t.parcel_id == parcel_id).await?;
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn transfers_involving(&self, identity: &str) -> Result<Vec<Transfer>> {
        let mut found = self.transfers_where(|t| t.is_party(identity)).await?;
        found.reverse();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn transfers_with_status(&self, status: TransferStatus) -> Result<Vec<Transfer>> {
        let mut found = self.transfers_where(|t| t.status == status).await?;
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[async_trait]
impl<C: LedgerClient + 'static> RegistryStore for LedgerStore<C> {
    fn backend_name(&self) -> &'static str {
        "ledger"
    }

    async fn commit(&self, mut transition: Transition) -> Result<()> {
        transition.normalize();
        transition.check_consistency()?;

        let call = ContractCall::CommitTransition {
            action: transition.action,
            parcel: transition.parcel,
            expected_version: transition.expected_parcel_version,
            transfer: transition.transfer,
            expected_status: transition.expected_transfer_status,
        };
        self.execute(&transition.actor, call).await?;
        Ok(())
    }
}
