//! Transfer records and the transfer state machine
//!
//! ```text
//! initiated ──► pending_approval ──► approved ──► completed
//!     │                │
//!     │                └──────────► rejected
//!     └────────────────┴──────────► cancelled
//! ```
//!
//! `completed`, `rejected` and `cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{RegistryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Kept for forward compatibility; new transfers start in `PendingApproval`.
    Initiated,
    #[default]
    PendingApproval,
    Approved,
    Completed,
    Rejected,
    Cancelled,
}

impl TransferStatus {
    pub const OPEN: [TransferStatus; 3] = [
        TransferStatus::Initiated,
        TransferStatus::PendingApproval,
        TransferStatus::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Non-terminal: holds the parcel's single transfer slot
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// States from which the initiator may still withdraw
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Initiated | Self::PendingApproval)
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Initiated, PendingApproval)
                | (Initiated, Cancelled)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (PendingApproval, Cancelled)
                | (Approved, Completed)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    #[default]
    Sale,
    Gift,
    Inheritance,
    CourtOrder,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Gift => "gift",
            Self::Inheritance => "inheritance",
            Self::CourtOrder => "court_order",
        }
    }
}

/// Fee components. `total` is always derived, never taken from input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    #[serde(default)]
    pub stamp_duty: f64,
    #[serde(default)]
    pub registration_fee: f64,
    #[serde(default)]
    pub other_charges: f64,
    #[serde(default)]
    pub total: f64,
}

impl FeeBreakdown {
    pub fn new(stamp_duty: f64, registration_fee: f64, other_charges: f64) -> Self {
        let mut fees = Self {
            stamp_duty,
            registration_fee,
            other_charges,
            total: 0.0,
        };
        fees.recompute();
        fees
    }

    pub fn recompute(&mut self) {
        self.total = self.stamp_duty + self.registration_fee + self.other_charges;
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("stampDuty", self.stamp_duty),
            ("registrationFee", self.registration_fee),
            ("otherCharges", self.other_charges),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RegistryError::Validation(format!(
                    "Fee component {} must be 0 or greater, got: {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// One entry of the approval audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One ownership-change attempt for a parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub transfer_id: String,
    pub parcel_id: String,
    pub from_owner: String,
    pub to_owner: String,
    pub initiated_by: String,
    pub transfer_type: TransferType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
    pub transfer_date: DateTime<Utc>,
    pub fees: FeeBreakdown,
    pub status: TransferStatus,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    pub fn is_party(&self, identity: &str) -> bool {
        self.from_owner == identity || self.to_owner == identity || self.initiated_by == identity
    }

    /// Move to `next`, refusing edges the state machine does not have
    pub fn advance(&mut self, next: TransferStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RegistryError::InvalidState(format!(
                "Transfer {} cannot move from {} to {}",
                self.transfer_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Input for initiating a transfer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateTransferInput {
    pub parcel_id: String,
    pub to_owner: String,
    pub transfer_type: TransferType,
    pub sale_price: Option<f64>,
    pub transfer_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fees: FeeBreakdown,
}

impl InitiateTransferInput {
    pub fn validate(&self) -> Result<()> {
        if self.parcel_id.trim().is_empty() {
            return Err(RegistryError::Validation("Parcel id is required".into()));
        }
        if self.to_owner.trim().is_empty() {
            return Err(RegistryError::Validation("New owner is required".into()));
        }
        match (self.transfer_type, self.sale_price) {
            (TransferType::Sale, Some(price)) if price.is_finite() && price > 0.0 => {}
            (TransferType::Sale, _) => {
                return Err(RegistryError::Validation(
                    "Sale price must be greater than 0 for a sale".into(),
                ))
            }
            (_, Some(price)) if price != 0.0 => {
                return Err(RegistryError::Validation(format!(
                    "Sale price is only allowed for a sale, not {}",
                    self.transfer_type.as_str()
                )))
            }
            _ => {}
        }
        self.fees.validate()
    }

    /// Build a new transfer awaiting official review
    pub fn into_transfer(self, from_owner: &str, initiated_by: &str, now: DateTime<Utc>) -> Transfer {
        let sale_price = match self.transfer_type {
            TransferType::Sale => self.sale_price,
            _ => None,
        };
        let mut fees = self.fees;
        fees.recompute();

        Transfer {
            transfer_id: Uuid::new_v4().to_string(),
            parcel_id: self.parcel_id,
            from_owner: from_owner.to_string(),
            to_owner: self.to_owner,
            initiated_by: initiated_by.to_string(),
            transfer_type: self.transfer_type,
            sale_price,
            transfer_date: self.transfer_date.unwrap_or(now),
            fees,
            status: TransferStatus::PendingApproval,
            approvals: Vec::new(),
            rejection_reason: None,
            rejected_by: None,
            approved_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(price: Option<f64>) -> InitiateTransferInput {
        InitiateTransferInput {
            parcel_id: "P1".into(),
            to_owner: "bob".into(),
            transfer_type: TransferType::Sale,
            sale_price: price,
            transfer_date: None,
            fees: FeeBreakdown::default(),
        }
    }

    #[test]
    fn test_sale_price_boundary() {
        assert!(matches!(
            sale(Some(0.0)).validate(),
            Err(RegistryError::Validation(_))
        ));
        assert!(sale(None).validate().is_err());
        assert!(sale(Some(-5.0)).validate().is_err());
        assert!(sale(Some(0.01)).validate().is_ok());
    }

    #[test]
    fn test_gift_rejects_sale_price() {
        let mut input = sale(Some(100.0));
        input.transfer_type = TransferType::Gift;
        assert!(input.validate().is_err());

        input.sale_price = None;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_fee_total_ignores_caller_total() {
        let mut input = sale(Some(1000.0));
        input.fees = FeeBreakdown {
            stamp_duty: 50.0,
            registration_fee: 10.0,
            other_charges: 2.5,
            total: 9999.0,
        };
        let transfer = input.into_transfer("alice", "alice", Utc::now());
        assert_eq!(transfer.fees.total, 62.5);
        assert_eq!(transfer.status, TransferStatus::PendingApproval);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let mut input = sale(Some(1000.0));
        input.fees.other_charges = -1.0;
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_state_machine_edges() {
        use TransferStatus::*;
        assert!(PendingApproval.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Completed));
        assert!(!Approved.can_transition_to(Cancelled));
        assert!(!Rejected.can_transition_to(PendingApproval));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Approved));
    }

    #[test]
    fn test_open_and_terminal() {
        for status in TransferStatus::OPEN {
            assert!(status.is_open());
        }
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Approved.is_cancellable());
    }

    #[test]
    fn test_advance_refuses_illegal_edge() {
        let mut transfer = sale(Some(1.0)).into_transfer("alice", "alice", Utc::now());
        transfer.status = TransferStatus::Rejected;
        let err = transfer.advance(TransferStatus::Approved, Utc::now());
        assert!(matches!(err, Err(RegistryError::InvalidState(_))));
        assert_eq!(transfer.status, TransferStatus::Rejected);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&TransferType::CourtOrder).unwrap();
        assert_eq!(json, "\"court_order\"");
        let json = serde_json::to_string(&TransferStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
    }
}
