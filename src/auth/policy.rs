//! Roles and the capability check for registry operations
//!
//! All authorization decisions go through [`authorize`] so the whole policy
//! can be reviewed in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Parcel, Transfer};
use crate::types::{RegistryError, Result};

/// Role of an authenticated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Citizen,
    Owner,
    Official,
    Admin,
}

impl Role {
    /// Officials and admins may verify parcels and review transfers
    pub fn is_official(&self) -> bool {
        matches!(self, Role::Official | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.to_ascii_lowercase().as_str() {
            "citizen" => Some(Role::Citizen),
            "owner" => Some(Role::Owner),
            "official" => Some(Role::Official),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Citizen => write!(f, "citizen"),
            Role::Owner => write!(f, "owner"),
            Role::Official => write!(f, "official"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RegisterParcel,
    UpdateParcel,
    VerifyParcel,
    DeactivateParcel,
    AttachDocument,
    InitiateTransfer,
    ApproveTransfer,
    RejectTransfer,
    CancelTransfer,
    ViewTransfer,
    ReviewTransfers,
}

/// What an action is performed on
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Registry,
    Parcel(&'a Parcel),
    Transfer(&'a Transfer),
}

fn deny(message: &str) -> RegistryError {
    RegistryError::PermissionDenied(message.to_string())
}

/// Decide whether `caller` may perform `action` on `resource`
pub fn authorize(caller: &Caller, action: Action, resource: Resource<'_>) -> Result<()> {
    let role = caller.role;

    match (action, resource) {
        (Action::RegisterParcel, _)
        | (Action::UpdateParcel, _)
        | (Action::VerifyParcel, _)
        | (Action::ReviewTransfers, _) => {
            if role.is_official() {
                Ok(())
            } else {
                Err(deny("Official or admin role required"))
            }
        }

        (Action::DeactivateParcel, _) => {
            if role.is_admin() {
                Ok(())
            } else {
                Err(deny("Admin role required"))
            }
        }

        (Action::AttachDocument, Resource::Parcel(parcel)) => {
            if role.is_official() || parcel.is_owned_by(&caller.id) {
                Ok(())
            } else {
                Err(deny("Only the owner or an official can attach documents"))
            }
        }

        (Action::InitiateTransfer, Resource::Parcel(parcel)) => {
            if parcel.is_owned_by(&caller.id) {
                Ok(())
            } else {
                Err(deny("Only the current owner can initiate a transfer"))
            }
        }

        (Action::ApproveTransfer, Resource::Transfer(transfer))
        | (Action::RejectTransfer, Resource::Transfer(transfer)) => {
            if !role.is_official() {
                Err(deny("Official or admin role required"))
            } else if transfer.is_party(&caller.id) {
                Err(deny("Officials cannot review a transfer they are party to"))
            } else {
                Ok(())
            }
        }

        (Action::CancelTransfer, Resource::Transfer(transfer)) => {
            if transfer.initiated_by == caller.id {
                Ok(())
            } else {
                Err(deny("Only the initiator can cancel a transfer"))
            }
        }

        (Action::ViewTransfer, Resource::Transfer(transfer)) => {
            if role.is_official() || transfer.is_party(&caller.id) {
                Ok(())
            } else {
                Err(deny("Not a party to this transfer"))
            }
        }

        // Action checked against the wrong kind of resource
        _ => Err(deny("Operation not permitted")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransferStatus;

    fn parcel_owned_by(owner: &str) -> Parcel {
        Parcel {
            parcel_id: "P1".into(),
            owner: owner.into(),
            ..Default::default()
        }
    }

    fn transfer(from: &str, to: &str) -> Transfer {
        Transfer {
            transfer_id: "T1".into(),
            parcel_id: "P1".into(),
            from_owner: from.into(),
            to_owner: to.into(),
            initiated_by: from.into(),
            status: TransferStatus::PendingApproval,
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_actions_need_official() {
        let citizen = Caller::new("c", Role::Citizen);
        let official = Caller::new("o", Role::Official);
        let admin = Caller::new("a", Role::Admin);

        assert!(authorize(&citizen, Action::RegisterParcel, Resource::Registry).is_err());
        assert!(authorize(&official, Action::RegisterParcel, Resource::Registry).is_ok());
        assert!(authorize(&admin, Action::VerifyParcel, Resource::Registry).is_ok());
    }

    #[test]
    fn test_deactivate_is_admin_only() {
        let official = Caller::new("o", Role::Official);
        let admin = Caller::new("a", Role::Admin);
        let parcel = parcel_owned_by("alice");

        assert!(authorize(&official, Action::DeactivateParcel, Resource::Parcel(&parcel)).is_err());
        assert!(authorize(&admin, Action::DeactivateParcel, Resource::Parcel(&parcel)).is_ok());
    }

    #[test]
    fn test_only_owner_initiates() {
        let parcel = parcel_owned_by("alice");
        let alice = Caller::new("alice", Role::Owner);
        let bob = Caller::new("bob", Role::Owner);
        let official = Caller::new("o", Role::Official);

        assert!(authorize(&alice, Action::InitiateTransfer, Resource::Parcel(&parcel)).is_ok());
        assert!(matches!(
            authorize(&bob, Action::InitiateTransfer, Resource::Parcel(&parcel)),
            Err(RegistryError::PermissionDenied(_))
        ));
        assert!(authorize(&official, Action::InitiateTransfer, Resource::Parcel(&parcel)).is_err());
    }

    #[test]
    fn test_party_cannot_review_own_transfer() {
        let t = transfer("alice", "carol");
        let carol = Caller::new("carol", Role::Official);
        let other = Caller::new("oscar", Role::Official);

        assert!(authorize(&carol, Action::ApproveTransfer, Resource::Transfer(&t)).is_err());
        assert!(authorize(&other, Action::ApproveTransfer, Resource::Transfer(&t)).is_ok());
        assert!(authorize(&other, Action::RejectTransfer, Resource::Transfer(&t)).is_ok());
    }

    #[test]
    fn test_cancel_by_initiator_only() {
        let t = transfer("alice", "bob");
        let cancel =
            |caller: Caller| authorize(&caller, Action::CancelTransfer, Resource::Transfer(&t));

        assert!(cancel(Caller::new("alice", Role::Owner)).is_ok());
        assert!(cancel(Caller::new("bob", Role::Owner)).is_err());
        assert!(cancel(Caller::new("a", Role::Admin)).is_err());
    }

    #[test]
    fn test_view_transfer() {
        let t = transfer("alice", "bob");
        let view =
            |caller: Caller| authorize(&caller, Action::ViewTransfer, Resource::Transfer(&t));

        assert!(view(Caller::new("bob", Role::Citizen)).is_ok());
        assert!(view(Caller::new("eve", Role::Citizen)).is_err());
        assert!(view(Caller::new("o", Role::Official)).is_ok());
    }

    #[test]
    fn test_wrong_resource_is_denied() {
        let admin = Caller::new("a", Role::Admin);
        assert!(authorize(&admin, Action::InitiateTransfer, Resource::Registry).is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Official"), Some(Role::Official));
        assert_eq!(Role::parse("root"), None);
    }
}
