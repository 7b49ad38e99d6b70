//! In-process store
//!
//! All state sits behind one `RwLock`, so a transition is applied while
//! holding the write guard and is never observed half-done.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    open_transfer_conflict, version_conflict, ParcelChange, ParcelStore, RegistryStore,
    TransferStore, Transition,
};
use crate::model::{Parcel, ParcelQuery, Transfer, TransferStatus};
use crate::types::{RegistryError, Result};

#[derive(Default)]
struct State {
    parcels: HashMap<String, Parcel>,
    transfers: HashMap<String, Transfer>,
    /// Transfer ids in insertion order, used as a tie-break for equal timestamps
    transfer_order: Vec<String>,
    /// parcel id -> id of its open transfer
    open_by_parcel: HashMap<String, String>,
}

impl State {
    fn ordered_transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.transfer_order
            .iter()
            .filter_map(|id| self.transfers.get(id))
    }

    fn check_parcel_version(&self, parcel_id: &str, expected: i64) -> Result<()> {
        match self.parcels.get(parcel_id) {
            None => Err(RegistryError::NotFound(format!("Parcel {} not found", parcel_id))),
            Some(stored) if stored.deleted => {
                Err(RegistryError::NotFound(format!("Parcel {} not found", parcel_id)))
            }
            Some(stored) if stored.version != expected => Err(version_conflict(parcel_id)),
            Some(_) => Ok(()),
        }
    }
}

/// Store keeping everything in memory; the default backend for development
/// and tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParcelStore for InMemoryStore {
    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>> {
        let state = self.state.read().await;
        Ok(state
            .parcels
            .get(parcel_id)
            .filter(|p| !p.deleted)
            .cloned())
    }

    async fn search_parcels(&self, query: &ParcelQuery, limit: usize) -> Result<Vec<Parcel>> {
        let state = self.state.read().await;
        let mut found: Vec<Parcel> = state
            .parcels
            .values()
            .filter(|p| query.matches(p))
            .cloned()
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
        let mut state = self.state.write().await;
        let parcel_id = change.parcel.parcel_id.clone();

        match change.expected_version {
            None => {
                if state.parcels.contains_key(&parcel_id) {
                    return Err(RegistryError::Conflict(format!(
                        "Parcel {} is already registered",
                        parcel_id
                    )));
                }
            }
            Some(expected) => state.check_parcel_version(&parcel_id, expected)?,
        }

        debug!(parcel_id = %parcel_id, action = ?change.action, "Parcel saved");
        state.parcels.insert(parcel_id, change.parcel);
        Ok(())
    }
}

#[async_trait]
impl TransferStore for InMemoryStore {
    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        Ok(self.state.read().await.transfers.get(transfer_id).cloned())
    }

    async fn open_transfer_for(&self, parcel_id: &str) -> Result<Option<Transfer>> {
        let state = self.state.read().await;
        Ok(state
            .open_by_parcel
            .get(parcel_id)
            .and_then(|id| state.transfers.get(id))
            .cloned())
    }

    async fn transfers_for_parcel(&self, parcel_id: &str) -> Result<Vec<Transfer>> {
        let state = self.state.read().await;
        let mut found: Vec<Transfer> = state
            .ordered_transfers()
            .filter(|t| t.parcel_id == parcel_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn transfers_involving(&self, identity: &str) -> Result<Vec<Transfer>> {
        let state = self.state.read().await;
        let mut found: Vec<Transfer> = state
            .ordered_transfers()
            .filter(|t| t.is_party(identity))
            .cloned()
            .collect();
        found.reverse();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn transfers_with_status(&self, status: TransferStatus) -> Result<Vec<Transfer>> {
        let state = self.state.read().await;
        let mut found: Vec<Transfer> = state
            .ordered_transfers()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn commit(&self, mut transition: Transition) -> Result<()> {
        transition.normalize();
        transition.check_consistency()?;

        let mut state = self.state.write().await;
        let parcel_id = transition.parcel.parcel_id.clone();
        let transfer_id = transition.transfer.transfer_id.clone();

        state.check_parcel_version(&parcel_id, transition.expected_parcel_version)?;

        match transition.expected_transfer_status {
            None => {
                if state.transfers.contains_key(&transfer_id) {
                    return Err(RegistryError::Conflict(format!(
                        "Transfer {} already exists",
                        transfer_id
                    )));
                }
                if state.open_by_parcel.contains_key(&parcel_id) {
                    return Err(open_transfer_conflict(&parcel_id));
                }
            }
            Some(expected) => match state.transfers.get(&transfer_id) {
                None => {
                    return Err(RegistryError::NotFound(format!(
                        "Transfer {} not found",
                        transfer_id
                    )))
                }
                Some(stored) if stored.status != expected => {
                    return Err(RegistryError::Conflict(format!(
                        "Transfer {} was modified concurrently",
                        transfer_id
                    )))
                }
                Some(_) => {}
            },
        }

        // All checks passed; apply both records together
        if transition.transfer.status.is_open() {
            state
                .open_by_parcel
                .insert(parcel_id.clone(), transfer_id.clone());
        } else if state.open_by_parcel.get(&parcel_id) == Some(&transfer_id) {
            state.open_by_parcel.remove(&parcel_id);
        }
        if transition.expected_transfer_status.is_none() {
            state.transfer_order.push(transfer_id.clone());
        }
        state.transfers.insert(transfer_id, transition.transfer);
        state.parcels.insert(parcel_id, transition.parcel);
        Ok(())
    }
}
