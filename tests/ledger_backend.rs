//! Integration tests for the ledger-backed store
//!
//! The same workflow as the in-memory tests, but every write is a contract
//! call on the simulated chain and roles must also be granted on-chain.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use land_registry::auth::{Action, Caller, Role};
use land_registry::ledger::{
    ContractCall, InMemoryLedger, LedgerClient, LedgerStore, Receipt, ReceiptStatus, RevertKind,
};
use land_registry::model::{
    Address, Approval, CreateParcelInput, FeeBreakdown, GeoLocation, InitiateTransferInput,
    ParcelClassification, ParcelStatus, Transfer, TransferStatus, TransferType,
    VerificationStatus,
};
use land_registry::services::{EventBus, Services};
use land_registry::RegistryError;

const ADMIN: &str = "root";

struct Harness {
    services: Services,
    store: Arc<LedgerStore<InMemoryLedger>>,
}

fn official() -> Caller {
    Caller::new("oscar", Role::Official)
}

fn alice() -> Caller {
    Caller::new("alice", Role::Owner)
}

fn parcel_input(parcel_id: &str, owner: &str) -> CreateParcelInput {
    CreateParcelInput {
        parcel_id: parcel_id.into(),
        owner: owner.into(),
        location: GeoLocation {
            latitude: 19.07,
            longitude: 72.87,
        },
        address: Address {
            street: "4 Marine Drive".into(),
            city: "Mumbai".into(),
            state: "Maharashtra".into(),
            postal_code: "400020".into(),
        },
        area: 640.0,
        classification: ParcelClassification::Commercial,
        market_value: 900_000.0,
    }
}

fn sale(parcel_id: &str, to: &str) -> InitiateTransferInput {
    InitiateTransferInput {
        parcel_id: parcel_id.into(),
        to_owner: to.into(),
        transfer_type: TransferType::Sale,
        sale_price: Some(1000.0),
        transfer_date: None,
        fees: FeeBreakdown::new(10.0, 2.0, 0.0),
    }
}

/// Ledger with oscar granted official and P1 registered to alice
async fn harness() -> Harness {
    let chain = Arc::new(InMemoryLedger::new(ADMIN));
    let store = Arc::new(LedgerStore::new(chain, 1, Duration::from_millis(300)));
    store
        .grant_role(ADMIN, "oscar", Role::Official)
        .await
        .unwrap();

    let services = Services::new(store.clone(), Arc::new(EventBus::new()), 50);
    services
        .parcels
        .create(&official(), parcel_input("P1", "alice"))
        .await
        .unwrap();
    services
        .parcels
        .verify(&official(), "P1", VerificationStatus::Verified)
        .await
        .unwrap();

    Harness { services, store }
}

#[tokio::test]
async fn test_full_transfer_on_ledger() {
    let h = harness().await;
    assert_eq!(h.services.backend_name(), "ledger");

    let transfer = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap();
    assert_eq!(
        h.services.parcels.get("P1").await.unwrap().status,
        ParcelStatus::UnderTransfer
    );

    let on_chain = h.store.client().pending_transfer("P1").await.unwrap();
    assert_eq!(on_chain.map(|t| t.transfer_id), Some(transfer.transfer_id.clone()));

    let completed = h
        .services
        .transfers
        .approve(&official(), &transfer.transfer_id, None)
        .await
        .unwrap();
    assert_eq!(completed.status, TransferStatus::Completed);

    let parcel = h.services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.owner, "bob");
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert!(h.store.client().pending_transfer("P1").await.unwrap().is_none());

    let history = h.services.history.ownership("P1").await.unwrap();
    assert_eq!(history.entries.len(), 2);
    assert_eq!(history.current_owner, "bob");
}

#[tokio::test]
async fn test_second_initiate_conflicts_on_ledger() {
    let h = harness().await;
    h.services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap();

    let err = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "carol"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Conflict(_)));
}

#[tokio::test]
async fn test_official_without_grant_is_reverted() {
    let h = harness().await;
    let transfer = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap();

    // Token says official, chain says otherwise
    let impostor = Caller::new("mallory", Role::Official);
    let err = h
        .services
        .transfers
        .approve(&impostor, &transfer.transfer_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied(_)));

    let parcel = h.services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.owner, "alice");
    assert_eq!(parcel.status, ParcelStatus::UnderTransfer);
}

#[tokio::test]
async fn test_submission_failure_is_retryable() {
    let h = harness().await;
    h.store.client().fail_next_submissions(1);

    let err = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(
        h.services.parcels.get("P1").await.unwrap().status,
        ParcelStatus::Active
    );

    h.services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unconfirmed_transaction_is_terminal() {
    let h = harness().await;
    h.store.client().set_stalled(true);

    let err = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotConfirmed(_)));
    assert!(!err.is_retryable());

    h.store.client().set_stalled(false);
    let parcel = h.services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert!(h.services.transfers.pending_for_parcel("P1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_grant_requires_admin() {
    let h = harness().await;
    let err = h
        .store
        .grant_role("oscar", "mallory", Role::Official)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied(_)));
    assert!(!h
        .store
        .client()
        .has_role("mallory", Role::Official)
        .await
        .unwrap());
}

/// Send a hand-built call straight to the chain, bypassing the services
async fn submit_direct(h: &Harness, sender: &str, call: ContractCall) -> Receipt {
    let chain = h.store.client();
    let tx = chain.submit(sender, call).await.unwrap();
    chain
        .wait_for_receipt(&tx, 1, Duration::from_secs(1))
        .await
        .unwrap()
}

fn assert_reverted(receipt: &Receipt, kind: RevertKind) {
    match &receipt.status {
        ReceiptStatus::Reverted(revert) => assert_eq!(revert.kind, kind, "{}", revert),
        ReceiptStatus::Confirmed => panic!("expected a revert, got {:?}", receipt),
    }
}

#[tokio::test]
async fn test_owner_cannot_self_complete_transfer() {
    let h = harness().await;
    let before = h.store.client().parcel("P1").await.unwrap().unwrap();
    let now = Utc::now();

    let mut next = before.next_revision(now);
    next.record_ownership_change("mallory", now, Some("T-direct".into()));
    let transfer = Transfer {
        transfer_id: "T-direct".into(),
        parcel_id: "P1".into(),
        from_owner: "alice".into(),
        to_owner: "mallory".into(),
        initiated_by: "alice".into(),
        status: TransferStatus::Completed,
        completed_at: Some(now),
        transfer_date: now,
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    let call = ContractCall::CommitTransition {
        action: Action::InitiateTransfer,
        parcel: next,
        expected_version: before.version,
        transfer,
        expected_status: None,
    };

    let receipt = submit_direct(&h, "alice", call).await;
    assert_reverted(&receipt, RevertKind::InvalidInput);

    let after = h.store.client().parcel("P1").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert!(h.store.client().transfer("T-direct").await.unwrap().is_none());
    assert!(h.store.client().pending_transfer("P1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_cannot_approve_through_chain() {
    let h = harness().await;
    let pending = h
        .services
        .transfers
        .initiate(&alice(), sale("P1", "bob"))
        .await
        .unwrap();
    let before = h.store.client().parcel("P1").await.unwrap().unwrap();
    let now = Utc::now();

    let mut transfer = pending.clone();
    transfer.approvals.push(Approval {
        approver: "alice".into(),
        approved_at: now,
        comment: None,
    });
    transfer.status = TransferStatus::Completed;
    transfer.approved_at = Some(now);
    transfer.completed_at = Some(now);
    let mut next = before.next_revision(now);
    next.record_ownership_change("bob", now, Some(pending.transfer_id.clone()));
    next.status = ParcelStatus::Active;

    let call = ContractCall::CommitTransition {
        action: Action::ApproveTransfer,
        parcel: next,
        expected_version: before.version,
        transfer,
        expected_status: Some(TransferStatus::PendingApproval),
    };
    let receipt = submit_direct(&h, "alice", call).await;
    assert_reverted(&receipt, RevertKind::Unauthorized);

    assert_eq!(h.store.client().parcel("P1").await.unwrap().unwrap(), before);
    let stored = h
        .services
        .transfers
        .pending_for_parcel("P1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.transfer_id, pending.transfer_id);
    assert_eq!(stored.status, TransferStatus::PendingApproval);
    assert!(stored.approvals.is_empty());

    // The real approval path still works afterwards
    h.services
        .transfers
        .approve(&official(), &pending.transfer_id, None)
        .await
        .unwrap();
    assert_eq!(h.services.parcels.get("P1").await.unwrap().owner, "bob");
}

#[tokio::test]
async fn test_document_call_cannot_rewrite_parcel() {
    let h = harness().await;
    let before = h.store.client().parcel("P1").await.unwrap().unwrap();

    let mut next = before.next_revision(Utc::now());
    next.owner = "mallory".into();
    next.status = ParcelStatus::Disputed;
    next.previous_owners.clear();
    let call = ContractCall::UpdateParcel {
        action: Action::AttachDocument,
        parcel: next,
        expected_version: before.version,
    };

    let receipt = submit_direct(&h, "alice", call).await;
    assert_reverted(&receipt, RevertKind::InvalidInput);

    let after = h.services.parcels.get("P1").await.unwrap();
    assert_eq!(after.owner, "alice");
    assert_eq!(after.status, ParcelStatus::Active);
    assert_eq!(after.version, before.version);
}
