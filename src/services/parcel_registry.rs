//! Parcel registry service
//!
//! Custody of parcel records: registration, descriptive updates,
//! verification, documents and soft deletion. Ownership and `status` are
//! never edited here except for deactivation; the transfer engine owns them.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::auth::{authorize, Action, Caller, Resource};
use crate::model::{
    AttachDocumentInput, CreateParcelInput, DocumentRef, Parcel, ParcelQuery, ParcelStatus,
    UpdateParcelInput, VerificationStatus,
};
use crate::store::{ParcelChange, RegistryStore};
use crate::types::{RegistryError, Result};

use super::events::{EventBus, RegistryEvent};
use super::log_failure;

pub struct ParcelRegistry {
    store: Arc<dyn RegistryStore>,
    events: Arc<EventBus>,
    search_limit: usize,
}

impl ParcelRegistry {
    pub fn new(store: Arc<dyn RegistryStore>, events: Arc<EventBus>, search_limit: usize) -> Self {
        Self {
            store,
            events,
            search_limit,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn get(&self, parcel_id: &str) -> Result<Parcel> {
        self.store
            .get_parcel(parcel_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("Parcel {} not found", parcel_id)))
    }

    /// Public search over verified, active parcels, newest first
    pub async fn search(&self, query: &ParcelQuery) -> Result<Vec<Parcel>> {
        if let (Some(min), Some(max)) = (query.min_area, query.max_area) {
            if min > max {
                return Err(RegistryError::Validation(format!(
                    "minArea ({}) must not exceed maxArea ({})",
                    min, max
                )));
            }
        }
        let limit = query.effective_limit(self.search_limit);
        self.store.search_parcels(query, limit).await
    }

    /// Whether `identity` currently owns the parcel; unknown parcels are owned by nobody
    pub async fn is_owner_of(&self, parcel_id: &str, identity: &str) -> Result<bool> {
        Ok(self
            .store
            .get_parcel(parcel_id)
            .await?
            .map(|p| p.is_owned_by(identity))
            .unwrap_or(false))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub async fn create(&self, caller: &Caller, input: CreateParcelInput) -> Result<Parcel> {
        self.try_create(caller, input)
            .await
            .inspect_err(|e| log_failure("create_parcel", caller, e))
    }

    async fn try_create(&self, caller: &Caller, input: CreateParcelInput) -> Result<Parcel> {
        authorize(caller, Action::RegisterParcel, Resource::Registry)?;
        input.validate()?;

        let parcel = input.into_parcel(&caller.id, Utc::now());
        self.store
            .save_parcel(ParcelChange {
                actor: caller.id.clone(),
                action: Action::RegisterParcel,
                parcel: parcel.clone(),
                expected_version: None,
            })
            .await?;

        info!(parcel_id = %parcel.parcel_id, owner = %parcel.owner, by = %caller.id, "Parcel created");
        self.events.emit(RegistryEvent::ParcelRegistered {
            parcel_id: parcel.parcel_id.clone(),
            owner: parcel.owner.clone(),
            registered_by: caller.id.clone(),
        });
        Ok(parcel)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        parcel_id: &str,
        input: UpdateParcelInput,
    ) -> Result<Parcel> {
        self.try_update(caller, parcel_id, input)
            .await
            .inspect_err(|e| log_failure("update_parcel", caller, e))
    }

    async fn try_update(
        &self,
        caller: &Caller,
        parcel_id: &str,
        input: UpdateParcelInput,
    ) -> Result<Parcel> {
        authorize(caller, Action::UpdateParcel, Resource::Registry)?;
        input.validate()?;
        let current = self.get(parcel_id).await?;

        let mut next = current.next_revision(Utc::now());
        input.apply_to(&mut next);
        self.save(caller, Action::UpdateParcel, &current, next.clone())
            .await?;

        info!(parcel_id = %parcel_id, by = %caller.id, "Parcel updated");
        self.events.emit(RegistryEvent::ParcelUpdated {
            parcel_id: parcel_id.to_string(),
            updated_by: caller.id.clone(),
        });
        Ok(next)
    }

    /// Record an official's verification decision.
    ///
    /// Repeating the current decision changes nothing.
    pub async fn verify(
        &self,
        caller: &Caller,
        parcel_id: &str,
        decision: VerificationStatus,
    ) -> Result<Parcel> {
        self.try_verify(caller, parcel_id, decision)
            .await
            .inspect_err(|e| log_failure("verify_parcel", caller, e))
    }

    async fn try_verify(
        &self,
        caller: &Caller,
        parcel_id: &str,
        decision: VerificationStatus,
    ) -> Result<Parcel> {
        authorize(caller, Action::VerifyParcel, Resource::Registry)?;
        if decision == VerificationStatus::Pending {
            return Err(RegistryError::Validation(
                "Verification decision must be verified or rejected".into(),
            ));
        }
        let current = self.get(parcel_id).await?;
        if current.verification == decision {
            return Ok(current);
        }

        let now = Utc::now();
        let mut next = current.next_revision(now);
        next.verification = decision;
        next.verified_by = Some(caller.id.clone());
        next.verified_at = Some(now);
        self.save(caller, Action::VerifyParcel, &current, next.clone())
            .await?;

        info!(parcel_id = %parcel_id, decision = decision.as_str(), by = %caller.id, "Parcel verification set");
        self.events.emit(RegistryEvent::ParcelVerified {
            parcel_id: parcel_id.to_string(),
            decision,
            verified_by: caller.id.clone(),
        });
        Ok(next)
    }

    pub async fn attach_document(
        &self,
        caller: &Caller,
        parcel_id: &str,
        input: AttachDocumentInput,
    ) -> Result<Parcel> {
        self.try_attach_document(caller, parcel_id, input)
            .await
            .inspect_err(|e| log_failure("attach_document", caller, e))
    }

    async fn try_attach_document(
        &self,
        caller: &Caller,
        parcel_id: &str,
        input: AttachDocumentInput,
    ) -> Result<Parcel> {
        let current = self.get(parcel_id).await?;
        authorize(caller, Action::AttachDocument, Resource::Parcel(&current))?;
        input.validate()?;

        if current
            .documents
            .iter()
            .any(|d| d.content_hash == input.content_hash)
        {
            return Err(RegistryError::Conflict(format!(
                "Document {} is already attached to parcel {}",
                input.content_hash, parcel_id
            )));
        }

        let now = Utc::now();
        let mut next = current.next_revision(now);
        next.documents.push(DocumentRef {
            document_type: input.document_type,
            content_hash: input.content_hash.clone(),
            storage_locator: input.storage_locator,
            uploaded_by: caller.id.clone(),
            uploaded_at: now,
        });
        self.save(caller, Action::AttachDocument, &current, next.clone())
            .await?;

        self.events.emit(RegistryEvent::DocumentAttached {
            parcel_id: parcel_id.to_string(),
            content_hash: input.content_hash,
            uploaded_by: caller.id.clone(),
        });
        Ok(next)
    }

    /// Soft delete: the parcel becomes inactive and disappears from reads,
    /// its transfer history stays.
    pub async fn delete(&self, caller: &Caller, parcel_id: &str) -> Result<()> {
        self.try_delete(caller, parcel_id)
            .await
            .inspect_err(|e| log_failure("delete_parcel", caller, e))
    }

    async fn try_delete(&self, caller: &Caller, parcel_id: &str) -> Result<()> {
        authorize(caller, Action::DeactivateParcel, Resource::Registry)?;
        let current = self.get(parcel_id).await?;

        if let Some(open) = self.store.open_transfer_for(parcel_id).await? {
            return Err(RegistryError::Conflict(format!(
                "Parcel {} has transfer {} in progress",
                parcel_id, open.transfer_id
            )));
        }

        let mut next = current.next_revision(Utc::now());
        next.status = ParcelStatus::Inactive;
        next.deleted = true;
        // An initiate racing this write bumps the version and makes it fail
        self.save(caller, Action::DeactivateParcel, &current, next)
            .await?;

        info!(parcel_id = %parcel_id, by = %caller.id, "Parcel deactivated");
        self.events.emit(RegistryEvent::ParcelDeactivated {
            parcel_id: parcel_id.to_string(),
            deactivated_by: caller.id.clone(),
        });
        Ok(())
    }

    async fn save(&self, caller: &Caller, action: Action, current: &Parcel, next: Parcel) -> Result<()> {
        self.store
            .save_parcel(ParcelChange {
                actor: caller.id.clone(),
                action,
                parcel: next,
                expected_version: Some(current.version),
            })
            .await
    }
}
