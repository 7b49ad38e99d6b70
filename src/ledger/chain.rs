//! In-process chain simulator
//!
//! Each accepted submission is mined into its own block. While a client
//! waits for more confirmations the chain keeps producing empty blocks.
//! Submission outages and stalled mining can be switched on to exercise the
//! retryable and not-confirmed paths.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::Role;
use crate::ledger::client::{LedgerClient, Receipt, ReceiptStatus, TxHash};
use crate::ledger::contract::{ContractCall, RegistryContract};
use crate::model::{Parcel, Transfer};
use crate::types::{RegistryError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Chain {
    contract: RegistryContract,
    height: u64,
    nonce: u64,
    receipts: HashMap<TxHash, Receipt>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    sender: &'a str,
    nonce: u64,
    call: &'a ContractCall,
}

pub struct InMemoryLedger {
    chain: Mutex<Chain>,
    failing_submissions: AtomicU32,
    stalled: AtomicBool,
}

impl InMemoryLedger {
    /// Genesis with the registry contract deployed by `admin`
    pub fn new(admin: &str) -> Self {
        Self {
            chain: Mutex::new(Chain {
                contract: RegistryContract::deploy(admin),
                height: 0,
                nonce: 0,
                receipts: HashMap::new(),
            }),
            failing_submissions: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    /// Reject the next `count` submissions as if the node were unreachable
    pub fn fail_next_submissions(&self, count: u32) {
        self.failing_submissions.store(count, Ordering::SeqCst);
    }

    /// Accept submissions without ever mining them
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub async fn height(&self) -> u64 {
        self.chain.lock().await.height
    }

    fn take_failure(&self) -> bool {
        self.failing_submissions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn tx_hash(envelope: &Envelope<'_>) -> Result<TxHash> {
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| RegistryError::Internal(format!("Failed to encode transaction: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit(&self, sender: &str, call: ContractCall) -> Result<TxHash> {
        if self.take_failure() {
            warn!(method = call.method(), "Ledger submission failed");
            return Err(RegistryError::Storage("Ledger node unavailable".into()));
        }

        let mut chain = self.chain.lock().await;
        chain.nonce += 1;
        let hash = tx_hash(&Envelope {
            sender,
            nonce: chain.nonce,
            call: &call,
        })?;

        if self.stalled.load(Ordering::SeqCst) {
            debug!(tx = %hash, "Transaction accepted into mempool, mining stalled");
            return Ok(hash);
        }

        chain.height += 1;
        let status = match chain.contract.execute(sender, &call) {
            Ok(()) => ReceiptStatus::Confirmed,
            Err(revert) => ReceiptStatus::Reverted(revert),
        };
        debug!(
            tx = %hash,
            method = call.method(),
            height = chain.height,
            status = ?status,
            "Transaction mined"
        );
        let receipt = Receipt {
            tx_hash: hash.clone(),
            block_height: chain.height,
            status,
        };
        chain.receipts.insert(hash.clone(), receipt);
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Receipt> {
        let confirmations = confirmations.max(1);

        let wait = async {
            loop {
                {
                    let mut chain = self.chain.lock().await;
                    if let Some(receipt) = chain.receipts.get(tx_hash).cloned() {
                        let depth = chain.height - receipt.block_height + 1;
                        if depth >= confirmations {
                            return receipt;
                        }
                        if !self.stalled.load(Ordering::SeqCst) {
                            chain.height += 1;
                        }
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            RegistryError::NotConfirmed(format!(
                "Transaction {} not confirmed within {:?}",
                tx_hash, timeout
            ))
        })
    }

    async fn parcel(&self, parcel_id: &str) -> Result<Option<Parcel>> {
        Ok(self.chain.lock().await.contract.parcel(parcel_id).cloned())
    }

    async fn parcels(&self) -> Result<Vec<Parcel>> {
        Ok(self
            .chain
            .lock()
            .await
            .contract
            .parcels()
            .cloned()
            .collect())
    }

    async fn transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        Ok(self
            .chain
            .lock()
            .await
            .contract
            .transfer(transfer_id)
            .cloned())
    }

    async fn pending_transfer(&self, parcel_id: &str) -> Result<Option<Transfer>> {
        Ok(self
            .chain
            .lock()
            .await
            .contract
            .pending_transfer(parcel_id)
            .cloned())
    }

    async fn transfers(&self) -> Result<Vec<Transfer>> {
        Ok(self
            .chain
            .lock()
            .await
            .contract
            .transfers()
            .cloned()
            .collect())
    }

    async fn has_role(&self, account: &str, role: Role) -> Result<bool> {
        Ok(self.chain.lock().await.contract.has_role(account, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(account: &str) -> ContractCall {
        ContractCall::GrantRole {
            account: account.into(),
            role: Role::Official,
        }
    }

    #[tokio::test]
    async fn test_each_submission_mines_a_block() {
        let ledger = InMemoryLedger::new("admin");
        let tx = ledger.submit("admin", grant("oscar")).await.unwrap();

        let receipt = ledger
            .wait_for_receipt(&tx, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.block_height, 1);
        assert_eq!(receipt.status, ReceiptStatus::Confirmed);
        assert_eq!(receipt.tx_hash.len(), 64);
        assert!(ledger.has_role("oscar", Role::Official).await.unwrap());
    }

    #[tokio::test]
    async fn test_reverted_call_gets_receipt() {
        let ledger = InMemoryLedger::new("admin");
        let tx = ledger.submit("mallory", grant("mallory")).await.unwrap();

        let receipt = ledger
            .wait_for_receipt(&tx, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(receipt.status, ReceiptStatus::Reverted(_)));
        assert!(!ledger.has_role("mallory", Role::Official).await.unwrap());
    }

    #[tokio::test]
    async fn test_deeper_confirmations_advance_chain() {
        let ledger = InMemoryLedger::new("admin");
        let tx = ledger.submit("admin", grant("oscar")).await.unwrap();

        ledger
            .wait_for_receipt(&tx, 3, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(ledger.height().await >= 3);
    }

    #[tokio::test]
    async fn test_submission_outage_is_retryable() {
        let ledger = InMemoryLedger::new("admin");
        ledger.fail_next_submissions(1);

        let err = ledger.submit("admin", grant("oscar")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.submit("admin", grant("oscar")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_chain_is_not_confirmed() {
        let ledger = InMemoryLedger::new("admin");
        ledger.set_stalled(true);
        let tx = ledger.submit("admin", grant("oscar")).await.unwrap();

        let err = ledger
            .wait_for_receipt(&tx, 1, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotConfirmed(_)));
        assert!(!ledger.has_role("oscar", Role::Official).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_unique_per_submission() {
        let ledger = InMemoryLedger::new("admin");
        let a = ledger.submit("admin", grant("oscar")).await.unwrap();
        let b = ledger.submit("admin", grant("oscar")).await.unwrap();
        assert_ne!(a, b);
    }
}
