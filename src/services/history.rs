//! Ownership history
//!
//! Read-only: the timeline is rebuilt on every request from the parcel's
//! closed ownership intervals plus its current owner.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Parcel, Transfer, TransferStatus, TransferType};
use crate::store::RegistryStore;
use crate::types::{RegistryError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub owner: String,
    pub from_date: DateTime<Utc>,
    /// `None` for the current owner
    pub to_date: Option<DateTime<Utc>>,
    pub is_current: bool,
    /// Transfer that ended this interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_type: Option<TransferType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipHistory {
    pub parcel_id: String,
    pub current_owner: String,
    pub entries: Vec<TimelineEntry>,
}

/// Merge closed intervals with the open current one, oldest first
pub fn ownership_timeline(parcel: &Parcel, transfers: &[Transfer]) -> Vec<TimelineEntry> {
    let completed: HashMap<&str, TransferType> = transfers
        .iter()
        .filter(|t| t.status == TransferStatus::Completed)
        .map(|t| (t.transfer_id.as_str(), t.transfer_type))
        .collect();

    let mut entries: Vec<TimelineEntry> = parcel
        .previous_owners
        .iter()
        .map(|interval| TimelineEntry {
            owner: interval.owner.clone(),
            from_date: interval.from_date,
            to_date: Some(interval.to_date),
            is_current: false,
            transfer_id: interval.transfer_id.clone(),
            transfer_type: interval
                .transfer_id
                .as_deref()
                .and_then(|id| completed.get(id).copied()),
        })
        .collect();
    entries.sort_by(|a, b| a.from_date.cmp(&b.from_date));

    entries.push(TimelineEntry {
        owner: parcel.owner.clone(),
        from_date: parcel.owner_since,
        to_date: None,
        is_current: true,
        transfer_id: None,
        transfer_type: None,
    });
    entries
}

pub struct HistoryLog {
    store: Arc<dyn RegistryStore>,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub async fn ownership(&self, parcel_id: &str) -> Result<OwnershipHistory> {
        let parcel = self
            .store
            .get_parcel(parcel_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("Parcel {} not found", parcel_id)))?;
        let transfers = self.store.transfers_for_parcel(parcel_id).await?;

        Ok(OwnershipHistory {
            parcel_id: parcel.parcel_id.clone(),
            current_owner: parcel.owner.clone(),
            entries: ownership_timeline(&parcel, &transfers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OwnershipInterval;
    use chrono::Duration;

    #[test]
    fn test_timeline_ends_with_open_current_entry() {
        let t0 = Utc::now() - Duration::days(100);
        let t1 = t0 + Duration::days(40);
        let t2 = t1 + Duration::days(30);

        let parcel = Parcel {
            parcel_id: "P1".into(),
            owner: "carol".into(),
            owner_since: t2,
            // Stored out of order on purpose
            previous_owners: vec![
                OwnershipInterval {
                    owner: "bob".into(),
                    from_date: t1,
                    to_date: t2,
                    transfer_id: Some("T2".into()),
                },
                OwnershipInterval {
                    owner: "alice".into(),
                    from_date: t0,
                    to_date: t1,
                    transfer_id: Some("T1".into()),
                },
            ],
            ..Default::default()
        };
        let transfers = vec![
            Transfer {
                transfer_id: "T1".into(),
                status: TransferStatus::Completed,
                transfer_type: TransferType::Inheritance,
                ..Default::default()
            },
            Transfer {
                transfer_id: "T2".into(),
                status: TransferStatus::Completed,
                transfer_type: TransferType::Sale,
                ..Default::default()
            },
        ];

        let timeline = ownership_timeline(&parcel, &transfers);
        let owners: Vec<&str> = timeline.iter().map(|e| e.owner.as_str()).collect();
        assert_eq!(owners, ["alice", "bob", "carol"]);
        assert_eq!(timeline[0].transfer_type, Some(TransferType::Inheritance));

        let current = timeline.last().unwrap();
        assert!(current.is_current);
        assert_eq!(current.to_date, None);
        assert_eq!(current.from_date, t2);
    }

    #[test]
    fn test_current_entry_serializes_null_to_date() {
        let parcel = Parcel {
            owner: "alice".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(ownership_timeline(&parcel, &[])).unwrap();
        assert!(json[0]["toDate"].is_null());
        assert_eq!(json[0]["isCurrent"], true);
    }
}
