//! On-chain registry contract
//!
//! State is keyed the way a contract stores it: parcels by parcel id, a
//! single pending-transfer slot per parcel id, transfers by id, and role
//! grants per account. Every mutating entry point checks role grants and
//! that the proposed records are a legal successor of the stored ones
//! before touching state, so a revert leaves the contract exactly as it was.
//! The action a call declares must be the one its change amounts to.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::auth::{Action, Role};
use crate::model::{Parcel, ParcelStatus, Transfer, TransferStatus, VerificationStatus};
use crate::types::RegistryError;

/// Calls accepted by the contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ContractCall {
    GrantRole {
        account: String,
        role: Role,
    },
    RevokeRole {
        account: String,
        role: Role,
    },
    RegisterParcel {
        parcel: Parcel,
    },
    UpdateParcel {
        action: Action,
        parcel: Parcel,
        expected_version: i64,
    },
    CommitTransition {
        action: Action,
        parcel: Parcel,
        expected_version: i64,
        transfer: Transfer,
        expected_status: Option<TransferStatus>,
    },
}

impl ContractCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::GrantRole { .. } => "grant_role",
            Self::RevokeRole { .. } => "revoke_role",
            Self::RegisterParcel { .. } => "register_parcel",
            Self::UpdateParcel { .. } => "update_parcel",
            Self::CommitTransition { .. } => "commit_transition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertKind {
    Unauthorized,
    NotFound,
    Conflict,
    InvalidState,
    InvalidInput,
}

/// Reason a call was reverted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revert {
    pub kind: RevertKind,
    pub message: String,
}

impl Revert {
    fn new(kind: RevertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<Revert> for RegistryError {
    fn from(revert: Revert) -> Self {
        match revert.kind {
            RevertKind::Unauthorized => RegistryError::PermissionDenied(revert.message),
            RevertKind::NotFound => RegistryError::NotFound(revert.message),
            RevertKind::Conflict => RegistryError::Conflict(revert.message),
            RevertKind::InvalidState => RegistryError::InvalidState(revert.message),
            RevertKind::InvalidInput => RegistryError::Validation(revert.message),
        }
    }
}

type CallResult = std::result::Result<(), Revert>;

#[derive(Debug, Clone, Default)]
pub struct RegistryContract {
    parcels: HashMap<String, Parcel>,
    transfers: HashMap<String, Transfer>,
    transfer_order: Vec<String>,
    /// parcel id -> open transfer id
    pending: HashMap<String, String>,
    roles: HashMap<String, HashSet<Role>>,
}

impl RegistryContract {
    /// Deploy with `admin` as the only privileged account
    pub fn deploy(admin: &str) -> Self {
        let mut contract = Self::default();
        contract
            .roles
            .entry(admin.to_string())
            .or_default()
            .insert(Role::Admin);
        contract
    }

    pub fn has_role(&self, account: &str, role: Role) -> bool {
        self.roles
            .get(account)
            .map(|granted| granted.contains(&role))
            .unwrap_or(false)
    }

    fn is_official(&self, account: &str) -> bool {
        self.has_role(account, Role::Official) || self.has_role(account, Role::Admin)
    }

    fn only_role(&self, sender: &str, roles: &[Role]) -> CallResult {
        if roles.iter().any(|r| self.has_role(sender, *r)) {
            Ok(())
        } else {
            Err(Revert::new(
                RevertKind::Unauthorized,
                format!("{} lacks a required role", sender),
            ))
        }
    }

    fn only_official(&self, sender: &str) -> CallResult {
        self.only_role(sender, &[Role::Official, Role::Admin])
    }

    /// Guard for actions on an existing parcel and optionally its transfer
    fn guard(
        &self,
        sender: &str,
        action: Action,
        parcel: &Parcel,
        transfer: Option<&Transfer>,
    ) -> CallResult {
        let deny = |message: &str| Err(Revert::new(RevertKind::Unauthorized, message));

        match action {
            Action::RegisterParcel | Action::UpdateParcel | Action::VerifyParcel => {
                self.only_official(sender)
            }
            Action::DeactivateParcel => self.only_role(sender, &[Role::Admin]),
            Action::AttachDocument => {
                if parcel.is_owned_by(sender) || self.is_official(sender) {
                    Ok(())
                } else {
                    deny("only the owner or an official may attach documents")
                }
            }
            Action::InitiateTransfer => {
                if parcel.is_owned_by(sender) {
                    Ok(())
                } else {
                    deny("only the current owner may initiate a transfer")
                }
            }
            Action::ApproveTransfer | Action::RejectTransfer => {
                self.only_official(sender)?;
                match transfer {
                    Some(t) if t.is_party(sender) => deny("reviewer is a party to the transfer"),
                    _ => Ok(()),
                }
            }
            Action::CancelTransfer => match transfer {
                Some(t) if t.initiated_by == sender => Ok(()),
                _ => deny("only the initiator may cancel a transfer"),
            },
            Action::ViewTransfer | Action::ReviewTransfers => Err(Revert::new(
                RevertKind::InvalidInput,
                "not a mutating action",
            )),
        }
    }

    fn live_parcel(&self, parcel_id: &str, expected_version: i64) -> Result<&Parcel, Revert> {
        let stored = self
            .parcels
            .get(parcel_id)
            .filter(|p| !p.deleted)
            .ok_or_else(|| {
                Revert::new(RevertKind::NotFound, format!("Parcel {} not found", parcel_id))
            })?;
        if stored.version != expected_version {
            return Err(Revert::new(
                RevertKind::Conflict,
                format!("Parcel {} was modified concurrently", parcel_id),
            ));
        }
        Ok(stored)
    }

    /// Run one call from `sender`
    pub fn execute(&mut self, sender: &str, call: &ContractCall) -> CallResult {
        match call {
            ContractCall::GrantRole { account, role } => {
                self.only_role(sender, &[Role::Admin])?;
                self.roles.entry(account.clone()).or_default().insert(*role);
                Ok(())
            }
            ContractCall::RevokeRole { account, role } => {
                self.only_role(sender, &[Role::Admin])?;
                if account == sender && *role == Role::Admin {
                    return Err(Revert::new(
                        RevertKind::InvalidInput,
                        "admin cannot revoke its own admin role",
                    ));
                }
                if let Some(granted) = self.roles.get_mut(account) {
                    granted.remove(role);
                }
                Ok(())
            }
            ContractCall::RegisterParcel { parcel } => {
                self.only_official(sender)?;
                if self.parcels.contains_key(&parcel.parcel_id) {
                    return Err(Revert::new(
                        RevertKind::Conflict,
                        format!("Parcel {} is already registered", parcel.parcel_id),
                    ));
                }
                check_fresh(parcel)?;
                self.parcels.insert(parcel.parcel_id.clone(), parcel.clone());
                Ok(())
            }
            ContractCall::UpdateParcel {
                action,
                parcel,
                expected_version,
            } => {
                let stored = self.live_parcel(&parcel.parcel_id, *expected_version)?;
                self.guard(sender, *action, stored, None)?;
                let has_open_transfer = self.pending.contains_key(&parcel.parcel_id);
                if *action == Action::DeactivateParcel && has_open_transfer {
                    return Err(Revert::new(
                        RevertKind::Conflict,
                        format!("Parcel {} has a transfer in progress", parcel.parcel_id),
                    ));
                }
                let next = revise_parcel(sender, *action, stored, parcel)?;
                self.parcels.insert(next.parcel_id.clone(), next);
                Ok(())
            }
            ContractCall::CommitTransition {
                action,
                parcel,
                expected_version,
                transfer,
                expected_status,
            } => self.commit_transition(
                sender,
                *action,
                parcel,
                *expected_version,
                transfer,
                *expected_status,
            ),
        }
    }

    fn commit_transition(
        &mut self,
        sender: &str,
        action: Action,
        parcel: &Parcel,
        expected_version: i64,
        transfer: &Transfer,
        expected_status: Option<TransferStatus>,
    ) -> CallResult {
        if parcel.parcel_id != transfer.parcel_id {
            return Err(invalid_input("transfer does not belong to parcel"));
        }
        let parcel_id = &parcel.parcel_id;
        let stored_parcel = self.live_parcel(parcel_id, expected_version)?;

        let (derived, stored_transfer) = match expected_status {
            None => {
                if self.transfers.contains_key(&transfer.transfer_id) {
                    return Err(Revert::new(
                        RevertKind::Conflict,
                        format!("Transfer {} already exists", transfer.transfer_id),
                    ));
                }
                if self.pending.contains_key(parcel_id) {
                    return Err(Revert::new(
                        RevertKind::Conflict,
                        format!("Parcel {} already has a transfer in progress", parcel_id),
                    ));
                }
                (Action::InitiateTransfer, None)
            }
            Some(expected) => {
                let stored = self.transfers.get(&transfer.transfer_id).ok_or_else(|| {
                    Revert::new(
                        RevertKind::NotFound,
                        format!("Transfer {} not found", transfer.transfer_id),
                    )
                })?;
                if stored.status != expected {
                    return Err(Revert::new(
                        RevertKind::Conflict,
                        format!("Transfer {} was modified concurrently", transfer.transfer_id),
                    ));
                }
                if stored.parcel_id != *parcel_id {
                    return Err(invalid_input("transfer does not belong to parcel"));
                }
                (transition_action(stored.status, transfer.status)?, Some(stored))
            }
        };
        if derived != action {
            return Err(invalid_input(format!(
                "{:?} does not describe a {} to {} transition",
                action,
                stored_transfer.map_or("new", |t| t.status.as_str()),
                transfer.status
            )));
        }

        // Ownership guards look at the stored records, not the proposed ones
        self.guard(sender, derived, stored_parcel, stored_transfer.or(Some(transfer)))?;

        let next_transfer = match stored_transfer {
            None => opened_transfer(sender, stored_parcel, transfer)?,
            Some(stored) => advanced_transfer(sender, stored, transfer)?,
        };
        let next_parcel = transferred_parcel(stored_parcel, &next_transfer, parcel)?;

        if next_transfer.status.is_open() {
            self.pending
                .insert(parcel_id.clone(), next_transfer.transfer_id.clone());
        } else if self.pending.get(parcel_id) == Some(&next_transfer.transfer_id) {
            self.pending.remove(parcel_id);
        }
        if expected_status.is_none() {
            self.transfer_order.push(next_transfer.transfer_id.clone());
        }
        self.transfers
            .insert(next_transfer.transfer_id.clone(), next_transfer);
        self.parcels.insert(parcel_id.clone(), next_parcel);
        Ok(())
    }

    // Views

    pub fn parcel(&self, parcel_id: &str) -> Option<&Parcel> {
        self.parcels.get(parcel_id)
    }

    pub fn parcels(&self) -> impl Iterator<Item = &Parcel> {
        self.parcels.values()
    }

    pub fn transfer(&self, transfer_id: &str) -> Option<&Transfer> {
        self.transfers.get(transfer_id)
    }

    pub fn pending_transfer(&self, parcel_id: &str) -> Option<&Transfer> {
        self.pending
            .get(parcel_id)
            .and_then(|id| self.transfers.get(id))
    }

    /// Transfers in the order they were recorded
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.transfer_order
            .iter()
            .filter_map(|id| self.transfers.get(id))
    }
}

fn invalid_input(message: impl Into<String>) -> Revert {
    Revert::new(RevertKind::InvalidInput, message)
}

/// A registration starts from a blank record
fn check_fresh(parcel: &Parcel) -> CallResult {
    let fresh = parcel.version == 0
        && !parcel.owner.is_empty()
        && parcel.status == ParcelStatus::Active
        && parcel.verification == VerificationStatus::Pending
        && parcel.verified_by.is_none()
        && parcel.documents.is_empty()
        && parcel.previous_owners.is_empty()
        && !parcel.deleted;
    if fresh {
        Ok(())
    } else {
        Err(invalid_input(
            "a new parcel must be active, unverified and without history",
        ))
    }
}

/// Next revision of `stored` with only the fields `action` owns taken from
/// `proposed`. Owner and transfer status never change here.
fn revise_parcel(
    sender: &str,
    action: Action,
    stored: &Parcel,
    proposed: &Parcel,
) -> Result<Parcel, Revert> {
    let mut next = stored.next_revision(proposed.updated_at);
    match action {
        Action::UpdateParcel => {
            next.location = proposed.location;
            next.address = proposed.address.clone();
            next.area = proposed.area;
            next.classification = proposed.classification;
            next.market_value = proposed.market_value;
        }
        Action::VerifyParcel => {
            if proposed.verification == VerificationStatus::Pending
                || proposed.verified_by.as_deref() != Some(sender)
            {
                return Err(invalid_input(
                    "verification must be a decision recorded by the sender",
                ));
            }
            next.verification = proposed.verification;
            next.verified_by = proposed.verified_by.clone();
            next.verified_at = proposed.verified_at;
        }
        Action::AttachDocument => {
            match proposed.documents.strip_prefix(stored.documents.as_slice()) {
                Some([document]) if document.uploaded_by == sender => {
                    next.documents.push(document.clone())
                }
                _ => {
                    return Err(invalid_input(
                        "exactly one document uploaded by the sender may be appended",
                    ))
                }
            }
        }
        Action::DeactivateParcel => {
            next.status = ParcelStatus::Inactive;
            next.deleted = true;
        }
        other => {
            return Err(invalid_input(format!("{:?} is not a parcel update", other)));
        }
    }

    if next != *proposed {
        return Err(invalid_input(format!(
            "{:?} may not change other parcel fields",
            action
        )));
    }
    Ok(next)
}

/// Action a stored-to-proposed status change stands for.
/// Approval may run through `approved` to `completed` in one call.
fn transition_action(from: TransferStatus, to: TransferStatus) -> Result<Action, Revert> {
    let reachable = from.can_transition_to(to)
        || (from.can_transition_to(TransferStatus::Approved)
            && TransferStatus::Approved.can_transition_to(to));
    if !reachable {
        return Err(Revert::new(
            RevertKind::InvalidState,
            format!("transfer cannot move from {} to {}", from, to),
        ));
    }
    Ok(match to {
        TransferStatus::Initiated | TransferStatus::PendingApproval => Action::InitiateTransfer,
        TransferStatus::Approved | TransferStatus::Completed => Action::ApproveTransfer,
        TransferStatus::Rejected => Action::RejectTransfer,
        TransferStatus::Cancelled => Action::CancelTransfer,
    })
}

/// A new transfer: pending approval, from the current owner, no review state
fn opened_transfer(
    sender: &str,
    parcel: &Parcel,
    proposed: &Transfer,
) -> Result<Transfer, Revert> {
    if proposed.status != TransferStatus::PendingApproval {
        return Err(invalid_input("a new transfer must be pending approval"));
    }
    if parcel.status != ParcelStatus::Active {
        return Err(Revert::new(
            RevertKind::InvalidState,
            format!(
                "Parcel {} is {} and cannot be transferred",
                parcel.parcel_id, parcel.status
            ),
        ));
    }
    if proposed.from_owner != parcel.owner || proposed.initiated_by != sender {
        return Err(invalid_input(
            "a transfer must be initiated by and from the current owner",
        ));
    }
    if proposed.to_owner.is_empty() || proposed.to_owner == parcel.owner {
        return Err(invalid_input("new owner must differ from the current owner"));
    }
    let reviewed = !proposed.approvals.is_empty()
        || proposed.rejection_reason.is_some()
        || proposed.rejected_by.is_some()
        || proposed.approved_at.is_some()
        || proposed.completed_at.is_some()
        || proposed.cancelled_at.is_some();
    if reviewed {
        return Err(invalid_input("a new transfer carries no review state"));
    }

    let mut opened = proposed.clone();
    opened.fees.recompute();
    Ok(opened)
}

/// `stored` moved to the proposed status; everything the move does not
/// touch must match the stored record
fn advanced_transfer(
    sender: &str,
    stored: &Transfer,
    proposed: &Transfer,
) -> Result<Transfer, Revert> {
    let mut next = stored.clone();
    next.status = proposed.status;
    next.updated_at = proposed.updated_at;

    match proposed.status {
        TransferStatus::Approved | TransferStatus::Completed => {
            if stored.status != TransferStatus::Approved {
                match proposed.approvals.strip_prefix(stored.approvals.as_slice()) {
                    Some([approval]) if approval.approver == sender => {
                        next.approvals.push(approval.clone())
                    }
                    _ => {
                        return Err(invalid_input(
                            "approval must append one entry by the sender",
                        ))
                    }
                }
                next.approved_at = proposed.approved_at;
            }
            if proposed.status == TransferStatus::Completed {
                next.completed_at = proposed.completed_at;
            }
        }
        TransferStatus::Rejected => {
            let has_reason = proposed
                .rejection_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty());
            if !has_reason || proposed.rejected_by.as_deref() != Some(sender) {
                return Err(invalid_input(
                    "rejection needs a reason and the sender as reviewer",
                ));
            }
            next.rejection_reason = proposed.rejection_reason.clone();
            next.rejected_by = proposed.rejected_by.clone();
        }
        TransferStatus::Cancelled => next.cancelled_at = proposed.cancelled_at,
        TransferStatus::Initiated | TransferStatus::PendingApproval => {}
    }

    if next != *proposed {
        return Err(invalid_input(format!(
            "moving transfer {} to {} may not change other fields",
            stored.transfer_id, proposed.status
        )));
    }
    Ok(next)
}

/// The parcel once `transfer` is recorded. The owner changes only on
/// completion and only to the transfer's recipient.
fn transferred_parcel(
    stored: &Parcel,
    transfer: &Transfer,
    proposed: &Parcel,
) -> Result<Parcel, Revert> {
    let mut next = stored.next_revision(proposed.updated_at);
    match transfer.status {
        status if status.is_open() => next.status = ParcelStatus::UnderTransfer,
        TransferStatus::Completed => {
            if stored.owner != transfer.from_owner {
                return Err(Revert::new(
                    RevertKind::InvalidState,
                    format!(
                        "Parcel {} changed owner since the transfer began",
                        stored.parcel_id
                    ),
                ));
            }
            next.record_ownership_change(
                &transfer.to_owner,
                proposed.owner_since,
                Some(transfer.transfer_id.clone()),
            );
            next.status = ParcelStatus::Active;
        }
        _ => next.status = ParcelStatus::Active,
    }

    if next != *proposed {
        return Err(invalid_input(format!(
            "parcel {} does not follow transfer {} to {}",
            stored.parcel_id, transfer.transfer_id, transfer.status
        )));
    }
    Ok(next)
}
