//! Integration tests for the parcel transfer workflow
//!
//! These drive the services against the in-memory store, the same way the
//! HTTP handlers do.

use std::sync::Arc;

use land_registry::auth::{Caller, Role};
use land_registry::model::{
    Address, AttachDocumentInput, CreateParcelInput, FeeBreakdown, GeoLocation,
    InitiateTransferInput, ParcelClassification, ParcelQuery, ParcelStatus, TransferStatus,
    TransferType, VerificationStatus,
};
use land_registry::services::{EventBus, RegistryEvent, Services};
use land_registry::store::InMemoryStore;
use land_registry::RegistryError;

fn official() -> Caller {
    Caller::new("oscar", Role::Official)
}

fn admin() -> Caller {
    Caller::new("root", Role::Admin)
}

fn alice() -> Caller {
    Caller::new("alice", Role::Owner)
}

fn bob() -> Caller {
    Caller::new("bob", Role::Citizen)
}

fn services() -> Services {
    Services::new(Arc::new(InMemoryStore::new()), Arc::new(EventBus::new()), 50)
}

fn parcel_input(parcel_id: &str, owner: &str) -> CreateParcelInput {
    CreateParcelInput {
        parcel_id: parcel_id.into(),
        owner: owner.into(),
        location: GeoLocation {
            latitude: 12.97,
            longitude: 77.59,
        },
        address: Address {
            street: "12 Lake Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
        },
        area: 1200.0,
        classification: ParcelClassification::Residential,
        market_value: 250_000.0,
    }
}

fn sale(parcel_id: &str, to: &str, price: f64) -> InitiateTransferInput {
    InitiateTransferInput {
        parcel_id: parcel_id.into(),
        to_owner: to.into(),
        transfer_type: TransferType::Sale,
        sale_price: Some(price),
        transfer_date: None,
        fees: FeeBreakdown::new(50.0, 20.0, 5.5),
    }
}

/// Verified, active P1 owned by alice
async fn setup() -> Services {
    let services = services();
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
    services
}

/// under_transfer exactly when one open transfer exists
async fn assert_status_invariant(services: &Services, parcel_id: &str) {
    let parcel = services.parcels.get(parcel_id).await.unwrap();
    let open = services
        .transfers
        .history_for_parcel(parcel_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.status.is_open())
        .count();
    assert!(open <= 1, "{} open transfers on {}", open, parcel_id);
    assert_eq!(parcel.status == ParcelStatus::UnderTransfer, open == 1);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_non_owner_cannot_initiate() {
    let services = setup().await;

    let err = services
        .transfers
        .initiate(&bob(), sale("P1", "bob", 1000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied(_)));

    let parcel = services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert!(services.transfers.pending_for_parcel("P1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_initiates_transfer() {
    let services = setup().await;

    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::PendingApproval);
    assert_eq!(transfer.from_owner, "alice");
    assert_eq!(transfer.initiated_by, "alice");

    let parcel = services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.status, ParcelStatus::UnderTransfer);

    let pending = services.transfers.pending_for_parcel("P1").await.unwrap();
    assert_eq!(pending.map(|t| t.transfer_id), Some(transfer.transfer_id));
    assert_status_invariant(&services, "P1").await;
}

#[tokio::test]
async fn test_official_approval_changes_owner() {
    let services = setup().await;
    let before = services.parcels.get("P1").await.unwrap();
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let approved = services
        .transfers
        .approve(&official(), &transfer.transfer_id, Some("Deed checked".into()))
        .await
        .unwrap();
    assert_eq!(approved.status, TransferStatus::Completed);
    assert_eq!(approved.approvals.len(), 1);
    assert_eq!(approved.approvals[0].approver, "oscar");
    assert!(approved.completed_at.is_some());

    let parcel = services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.owner, "bob");
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert_eq!(parcel.previous_owners.len(), before.previous_owners.len() + 1);

    let closed = parcel.previous_owners.last().unwrap();
    assert_eq!(closed.owner, "alice");
    assert_eq!(closed.transfer_id.as_deref(), Some(transfer.transfer_id.as_str()));

    let history = services.history.ownership("P1").await.unwrap();
    let owners: Vec<&str> = history.entries.iter().map(|e| e.owner.as_str()).collect();
    assert_eq!(owners, ["alice", "bob"]);
    assert!(history.entries[0].to_date.is_some());
    assert!(history.entries[1].is_current);
    assert!(history.entries[1].to_date.is_none());
    assert_eq!(history.entries[0].transfer_type, Some(TransferType::Sale));

    assert_status_invariant(&services, "P1").await;
}

#[tokio::test]
async fn test_second_initiate_conflicts() {
    let services = setup().await;
    services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let err = services
        .transfers
        .initiate(&alice(), sale("P1", "carol", 2000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Conflict(_)));
    assert_eq!(services.transfers.history_for_parcel("P1").await.unwrap().len(), 1);
}

// =============================================================================
// Round-trips and boundaries
// =============================================================================

#[tokio::test]
async fn test_reject_restores_parcel() {
    let services = setup().await;
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let blank = services
        .transfers
        .reject(&official(), &transfer.transfer_id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(blank, RegistryError::Validation(_)));

    let rejected = services
        .transfers
        .reject(&official(), &transfer.transfer_id, "Stamp duty unpaid")
        .await
        .unwrap();
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Stamp duty unpaid"));
    assert_eq!(rejected.rejected_by.as_deref(), Some("oscar"));

    let parcel = services.parcels.get("P1").await.unwrap();
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert_eq!(parcel.owner, "alice");
    assert!(parcel.previous_owners.is_empty());
    assert_status_invariant(&services, "P1").await;

    // Terminal: a late approval is refused
    let err = services
        .transfers
        .approve(&official(), &transfer.transfer_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidState(_)));
}

#[tokio::test]
async fn test_sale_price_boundary() {
    let services = setup().await;

    let err = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(
        services.parcels.get("P1").await.unwrap().status,
        ParcelStatus::Active
    );

    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 0.01))
        .await
        .unwrap();
    assert_eq!(transfer.sale_price, Some(0.01));
}

#[tokio::test]
async fn test_gift_rejects_sale_price() {
    let services = setup().await;
    let mut gift = sale("P1", "bob", 500.0);
    gift.transfer_type = TransferType::Gift;

    let err = services.transfers.initiate(&alice(), gift).await.unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
}

#[tokio::test]
async fn test_fee_total_is_recomputed() {
    let services = setup().await;
    let mut input = sale("P1", "bob", 1000.0);
    input.fees.total = 1_000_000.0;

    let transfer = services.transfers.initiate(&alice(), input).await.unwrap();
    assert_eq!(transfer.fees.total, 50.0 + 20.0 + 5.5);

    let stored = services
        .transfers
        .get(&alice(), &transfer.transfer_id)
        .await
        .unwrap();
    assert_eq!(
        stored.fees.total,
        stored.fees.stamp_duty + stored.fees.registration_fee + stored.fees.other_charges
    );
}

#[tokio::test]
async fn test_transfer_to_self_is_invalid() {
    let services = setup().await;
    let err = services
        .transfers
        .initiate(&alice(), sale("P1", "alice", 1000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
}

#[tokio::test]
async fn test_verify_is_idempotent() {
    let services = setup().await;
    let once = services.parcels.get("P1").await.unwrap();

    let twice = services
        .parcels
        .verify(&official(), "P1", VerificationStatus::Verified)
        .await
        .unwrap();
    assert_eq!(once, twice);

    let pending = services
        .parcels
        .verify(&official(), "P1", VerificationStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(pending, RegistryError::Validation(_)));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initiates_exactly_one_wins() {
    let services = Arc::new(setup().await);

    let handles: Vec<_> = ["bob", "carol"]
        .into_iter()
        .map(|to| {
            let services = Arc::clone(&services);
            tokio::spawn(async move {
                services
                    .transfers
                    .initiate(&alice(), sale("P1", to, 1000.0))
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(RegistryError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((wins, conflicts), (1, 1));
    assert_status_invariant(&services, "P1").await;
}

// =============================================================================
// Authorization and lifecycle edges
// =============================================================================

#[tokio::test]
async fn test_cancel_by_initiator_only() {
    let services = setup().await;
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let err = services
        .transfers
        .cancel(&bob(), &transfer.transfer_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied(_)));

    let cancelled = services
        .transfers
        .cancel(&alice(), &transfer.transfer_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(
        services.parcels.get("P1").await.unwrap().status,
        ParcelStatus::Active
    );

    let again = services
        .transfers
        .cancel(&alice(), &transfer.transfer_id)
        .await
        .unwrap_err();
    assert!(matches!(again, RegistryError::InvalidState(_)));
}

#[tokio::test]
async fn test_party_official_cannot_approve() {
    let services = setup().await;
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "oscar", 1000.0))
        .await
        .unwrap();

    let err = services
        .transfers
        .approve(&official(), &transfer.transfer_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDenied(_)));

    let citizen = services
        .transfers
        .approve(&bob(), &transfer.transfer_id, None)
        .await
        .unwrap_err();
    assert!(matches!(citizen, RegistryError::PermissionDenied(_)));

    services
        .transfers
        .approve(&admin(), &transfer.transfer_id, None)
        .await
        .unwrap();
    assert_eq!(services.parcels.get("P1").await.unwrap().owner, "oscar");
}

#[tokio::test]
async fn test_delete_is_soft_and_guarded() {
    let services = setup().await;
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let busy = services.parcels.delete(&admin(), "P1").await.unwrap_err();
    assert!(matches!(busy, RegistryError::Conflict(_)));

    let official_delete = services.parcels.delete(&official(), "P1").await.unwrap_err();
    assert!(matches!(official_delete, RegistryError::PermissionDenied(_)));

    services
        .transfers
        .cancel(&alice(), &transfer.transfer_id)
        .await
        .unwrap();
    services.parcels.delete(&admin(), "P1").await.unwrap();

    let gone = services.parcels.get("P1").await.unwrap_err();
    assert!(matches!(gone, RegistryError::NotFound(_)));
    assert!(!services.parcels.is_owner_of("P1", "alice").await.unwrap());

    // History survives the parcel
    assert_eq!(services.transfers.history_for_parcel("P1").await.unwrap().len(), 1);

    let recreate = services
        .parcels
        .create(&official(), parcel_input("P1", "alice"))
        .await
        .unwrap_err();
    assert!(matches!(recreate, RegistryError::Conflict(_)));
}

#[tokio::test]
async fn test_missing_parcel_lookups() {
    let services = setup().await;

    let missing = services
        .transfers
        .initiate(&alice(), sale("P404", "bob", 1000.0))
        .await
        .unwrap_err();
    assert!(matches!(missing, RegistryError::NotFound(_)));

    let pending = services.transfers.pending_for_parcel("P404").await.unwrap_err();
    assert!(matches!(pending, RegistryError::NotFound(_)));
    assert!(services.transfers.history_for_parcel("P404").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transfer_visibility_and_queues() {
    let services = setup().await;
    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();

    let eve = Caller::new("eve", Role::Citizen);
    let hidden = services
        .transfers
        .get(&eve, &transfer.transfer_id)
        .await
        .unwrap_err();
    assert!(matches!(hidden, RegistryError::PermissionDenied(_)));
    assert!(services.transfers.get(&bob(), &transfer.transfer_id).await.is_ok());

    assert_eq!(services.transfers.list_mine(&bob()).await.unwrap().len(), 1);
    assert!(services.transfers.list_mine(&eve).await.unwrap().is_empty());

    let queue = services.transfers.list_pending(&official()).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert!(services.transfers.list_pending(&bob()).await.is_err());
}

// =============================================================================
// Registry operations
// =============================================================================

#[tokio::test]
async fn test_search_is_public_and_filtered() {
    let services = setup().await;
    services
        .parcels
        .create(&official(), parcel_input("P2", "dave"))
        .await
        .unwrap();

    // P2 is still pending verification
    let all = services.parcels.search(&ParcelQuery::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|p| p.parcel_id.as_str()).collect();
    assert_eq!(ids, ["P1"]);

    let by_city = services
        .parcels
        .search(&ParcelQuery {
            city: Some("bengal".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_city.len(), 1);

    let inverted = services
        .parcels
        .search(&ParcelQuery {
            min_area: Some(2000.0),
            max_area: Some(100.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(inverted, RegistryError::Validation(_)));

    // Parcels under transfer drop out of search
    services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();
    assert!(services
        .parcels
        .search(&ParcelQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_create_validation_and_permissions() {
    let services = services();

    let denied = services
        .parcels
        .create(&alice(), parcel_input("P9", "alice"))
        .await
        .unwrap_err();
    assert!(matches!(denied, RegistryError::PermissionDenied(_)));

    let mut bad_postal = parcel_input("P9", "alice");
    bad_postal.address.postal_code = "5600".into();
    let err = services.parcels.create(&official(), bad_postal).await.unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    let mut bad_area = parcel_input("P9", "alice");
    bad_area.area = 0.0;
    assert!(services.parcels.create(&official(), bad_area).await.is_err());

    let parcel = services
        .parcels
        .create(&official(), parcel_input("P9", "alice"))
        .await
        .unwrap();
    assert_eq!(parcel.status, ParcelStatus::Active);
    assert_eq!(parcel.verification, VerificationStatus::Pending);
    assert!(services.parcels.is_owner_of("P9", "alice").await.unwrap());
}

#[tokio::test]
async fn test_attach_document() {
    let services = setup().await;
    let deed = AttachDocumentInput {
        document_type: "sale_deed".into(),
        content_hash: "9f86d081884c7d659a2feaa0c55ad015".into(),
        storage_locator: "ipfs://bafy-deed".into(),
    };

    let denied = services
        .parcels
        .attach_document(&bob(), "P1", deed.clone())
        .await
        .unwrap_err();
    assert!(matches!(denied, RegistryError::PermissionDenied(_)));

    let parcel = services
        .parcels
        .attach_document(&alice(), "P1", deed.clone())
        .await
        .unwrap();
    assert_eq!(parcel.documents.len(), 1);
    assert_eq!(parcel.documents[0].uploaded_by, "alice");

    let duplicate = services
        .parcels
        .attach_document(&official(), "P1", deed)
        .await
        .unwrap_err();
    assert!(matches!(duplicate, RegistryError::Conflict(_)));
}

#[tokio::test]
async fn test_ownership_change_is_announced() {
    let services = setup().await;
    let mut events = services.events.subscribe();

    let transfer = services
        .transfers
        .initiate(&alice(), sale("P1", "bob", 1000.0))
        .await
        .unwrap();
    services
        .transfers
        .approve(&official(), &transfer.transfer_id, None)
        .await
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        RegistryEvent::TransferInitiated { .. }
    ));
    match events.recv().await.unwrap() {
        RegistryEvent::OwnershipChanged {
            previous_owner,
            new_owner,
            approved_by,
            ..
        } => {
            assert_eq!(previous_owner, "alice");
            assert_eq!(new_owner, "bob");
            assert_eq!(approved_by, "oscar");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
