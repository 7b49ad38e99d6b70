//! Transfer workflow engine
//!
//! The only component that moves a parcel in or out of `under_transfer`.
//! Every transition is checked here, then handed to the store as one
//! [`Transition`] so the parcel and transfer change together or not at all.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::auth::{authorize, Action, Caller, Resource};
use crate::model::{
    Approval, InitiateTransferInput, Parcel, ParcelStatus, Transfer, TransferStatus,
};
use crate::store::{RegistryStore, Transition};
use crate::types::{RegistryError, Result};

use super::events::{EventBus, RegistryEvent};
use super::log_failure;

pub struct TransferEngine {
    store: Arc<dyn RegistryStore>,
    events: Arc<EventBus>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn RegistryStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    async fn load_parcel(&self, parcel_id: &str) -> Result<Parcel> {
        self.store
            .get_parcel(parcel_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("Parcel {} not found", parcel_id)))
    }

    async fn load_transfer(&self, transfer_id: &str) -> Result<Transfer> {
        self.store
            .get_transfer(transfer_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("Transfer {} not found", transfer_id)))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Owner asks to hand the parcel to someone else
    pub async fn initiate(&self, caller: &Caller, input: InitiateTransferInput) -> Result<Transfer> {
        self.try_initiate(caller, input)
            .await
            .inspect_err(|e| log_failure("initiate_transfer", caller, e))
    }

    async fn try_initiate(&self, caller: &Caller, input: InitiateTransferInput) -> Result<Transfer> {
        let parcel = self.load_parcel(&input.parcel_id).await?;
        authorize(caller, Action::InitiateTransfer, Resource::Parcel(&parcel))?;
        input.validate()?;

        if input.to_owner == parcel.owner {
            return Err(RegistryError::Validation(
                "New owner must differ from the current owner".into(),
            ));
        }
        match parcel.status {
            ParcelStatus::Active => {}
            ParcelStatus::UnderTransfer => {
                return Err(RegistryError::Conflict(format!(
                    "Parcel {} already has a transfer in progress",
                    parcel.parcel_id
                )))
            }
            status => {
                return Err(RegistryError::InvalidState(format!(
                    "Parcel {} is {} and cannot be transferred",
                    parcel.parcel_id, status
                )))
            }
        }

        let now = Utc::now();
        let transfer = input.into_transfer(&parcel.owner, &caller.id, now);
        let mut next = parcel.next_revision(now);
        next.status = ParcelStatus::UnderTransfer;

        self.store
            .commit(Transition {
                actor: caller.id.clone(),
                action: Action::InitiateTransfer,
                parcel: next,
                expected_parcel_version: parcel.version,
                transfer: transfer.clone(),
                expected_transfer_status: None,
            })
            .await?;

        info!(
            transfer_id = %transfer.transfer_id,
            parcel_id = %transfer.parcel_id,
            from = %transfer.from_owner,
            to = %transfer.to_owner,
            "Transfer initiated"
        );
        self.events.emit(RegistryEvent::TransferInitiated {
            transfer_id: transfer.transfer_id.clone(),
            parcel_id: transfer.parcel_id.clone(),
            from_owner: transfer.from_owner.clone(),
            to_owner: transfer.to_owner.clone(),
            transfer_type: transfer.transfer_type,
        });
        Ok(transfer)
    }

    /// Official approval; ownership changes in the same step
    pub async fn approve(
        &self,
        caller: &Caller,
        transfer_id: &str,
        comment: Option<String>,
    ) -> Result<Transfer> {
        self.try_approve(caller, transfer_id, comment)
            .await
            .inspect_err(|e| log_failure("approve_transfer", caller, e))
    }

    async fn try_approve(
        &self,
        caller: &Caller,
        transfer_id: &str,
        comment: Option<String>,
    ) -> Result<Transfer> {
        let current = self.load_transfer(transfer_id).await?;
        authorize(caller, Action::ApproveTransfer, Resource::Transfer(&current))?;
        require_status(&current, TransferStatus::PendingApproval)?;
        let parcel = self.load_parcel(&current.parcel_id).await?;

        let now = Utc::now();
        let mut transfer = current.clone();
        transfer.approvals.push(Approval {
            approver: caller.id.clone(),
            approved_at: now,
            comment: comment.filter(|c| !c.trim().is_empty()),
        });
        transfer.advance(TransferStatus::Approved, now)?;
        transfer.approved_at = Some(now);
        transfer.advance(TransferStatus::Completed, now)?;
        transfer.completed_at = Some(now);

        let mut next = parcel.next_revision(now);
        next.record_ownership_change(&transfer.to_owner, now, Some(transfer.transfer_id.clone()));
        next.status = ParcelStatus::Active;

        self.store
            .commit(Transition {
                actor: caller.id.clone(),
                action: Action::ApproveTransfer,
                parcel: next,
                expected_parcel_version: parcel.version,
                transfer: transfer.clone(),
                expected_transfer_status: Some(TransferStatus::PendingApproval),
            })
            .await?;

        info!(
            transfer_id = %transfer_id,
            parcel_id = %transfer.parcel_id,
            approved_by = %caller.id,
            "Transfer approved and completed"
        );
        self.events.emit(RegistryEvent::OwnershipChanged {
            transfer_id: transfer.transfer_id.clone(),
            parcel_id: transfer.parcel_id.clone(),
            previous_owner: parcel.owner,
            new_owner: transfer.to_owner.clone(),
            approved_by: caller.id.clone(),
        });
        Ok(transfer)
    }

    pub async fn reject(&self, caller: &Caller, transfer_id: &str, reason: &str) -> Result<Transfer> {
        self.try_reject(caller, transfer_id, reason)
            .await
            .inspect_err(|e| log_failure("reject_transfer", caller, e))
    }

    async fn try_reject(&self, caller: &Caller, transfer_id: &str, reason: &str) -> Result<Transfer> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RegistryError::Validation("Rejection reason is required".into()));
        }
        let current = self.load_transfer(transfer_id).await?;
        authorize(caller, Action::RejectTransfer, Resource::Transfer(&current))?;
        require_status(&current, TransferStatus::PendingApproval)?;
        let parcel = self.load_parcel(&current.parcel_id).await?;

        let now = Utc::now();
        let mut transfer = current.clone();
        transfer.advance(TransferStatus::Rejected, now)?;
        transfer.rejection_reason = Some(reason.to_string());
        transfer.rejected_by = Some(caller.id.clone());

        self.release(caller, Action::RejectTransfer, &parcel, &transfer, current.status)
            .await?;

        info!(transfer_id = %transfer_id, rejected_by = %caller.id, "Transfer rejected");
        self.events.emit(RegistryEvent::TransferRejected {
            transfer_id: transfer.transfer_id.clone(),
            parcel_id: transfer.parcel_id.clone(),
            rejected_by: caller.id.clone(),
        });
        Ok(transfer)
    }

    /// Initiator withdraws before an official acted
    pub async fn cancel(&self, caller: &Caller, transfer_id: &str) -> Result<Transfer> {
        self.try_cancel(caller, transfer_id)
            .await
            .inspect_err(|e| log_failure("cancel_transfer", caller, e))
    }

    async fn try_cancel(&self, caller: &Caller, transfer_id: &str) -> Result<Transfer> {
        let current = self.load_transfer(transfer_id).await?;
        authorize(caller, Action::CancelTransfer, Resource::Transfer(&current))?;
        if !current.status.is_cancellable() {
            return Err(RegistryError::InvalidState(format!(
                "Transfer {} is {} and can no longer be cancelled",
                transfer_id, current.status
            )));
        }
        let parcel = self.load_parcel(&current.parcel_id).await?;

        let now = Utc::now();
        let mut transfer = current.clone();
        transfer.advance(TransferStatus::Cancelled, now)?;
        transfer.cancelled_at = Some(now);

        self.release(caller, Action::CancelTransfer, &parcel, &transfer, current.status)
            .await?;

        info!(transfer_id = %transfer_id, "Transfer cancelled");
        self.events.emit(RegistryEvent::TransferCancelled {
            transfer_id: transfer.transfer_id.clone(),
            parcel_id: transfer.parcel_id.clone(),
        });
        Ok(transfer)
    }

    /// Close a transfer without an ownership change; the parcel returns to active
    async fn release(
        &self,
        caller: &Caller,
        action: Action,
        parcel: &Parcel,
        transfer: &Transfer,
        expected: TransferStatus,
    ) -> Result<()> {
        let mut next = parcel.next_revision(transfer.updated_at);
        next.status = ParcelStatus::Active;

        self.store
            .commit(Transition {
                actor: caller.id.clone(),
                action,
                parcel: next,
                expected_parcel_version: parcel.version,
                transfer: transfer.clone(),
                expected_transfer_status: Some(expected),
            })
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The parcel's single open transfer, if any
    pub async fn pending_for_parcel(&self, parcel_id: &str) -> Result<Option<Transfer>> {
        self.load_parcel(parcel_id).await?;
        self.store.open_transfer_for(parcel_id).await
    }

    /// Every transfer of a parcel in creation order, including closed ones
    pub async fn history_for_parcel(&self, parcel_id: &str) -> Result<Vec<Transfer>> {
        self.store.transfers_for_parcel(parcel_id).await
    }

    pub async fn get(&self, caller: &Caller, transfer_id: &str) -> Result<Transfer> {
        let transfer = self.load_transfer(transfer_id).await?;
        authorize(caller, Action::ViewTransfer, Resource::Transfer(&transfer))?;
        Ok(transfer)
    }

    /// Transfers the caller is a party to, newest first
    pub async fn list_mine(&self, caller: &Caller) -> Result<Vec<Transfer>> {
        self.store.transfers_involving(&caller.id).await
    }

    /// Review queue for officials, oldest first
    pub async fn list_pending(&self, caller: &Caller) -> Result<Vec<Transfer>> {
        authorize(caller, Action::ReviewTransfers, Resource::Registry)?;
        self.store
            .transfers_with_status(TransferStatus::PendingApproval)
            .await
    }
}

fn require_status(transfer: &Transfer, expected: TransferStatus) -> Result<()> {
    if transfer.status == expected {
        Ok(())
    } else {
        Err(RegistryError::InvalidState(format!(
            "Transfer {} is {}, expected {}",
            transfer.transfer_id, transfer.status, expected
        )))
    }
}
