//! Registry event bus
//!
//! Committed changes are announced here after the store accepted them.
//! Delivery is fire-and-forget: a missing or lagging subscriber never fails
//! the operation that emitted the event.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::model::{TransferType, VerificationStatus};

/// Events emitted by the registry services
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    // Parcel events
    ParcelRegistered {
        parcel_id: String,
        owner: String,
        registered_by: String,
    },
    ParcelUpdated {
        parcel_id: String,
        updated_by: String,
    },
    ParcelVerified {
        parcel_id: String,
        decision: VerificationStatus,
        verified_by: String,
    },
    ParcelDeactivated {
        parcel_id: String,
        deactivated_by: String,
    },
    DocumentAttached {
        parcel_id: String,
        content_hash: String,
        uploaded_by: String,
    },

    // Transfer events
    TransferInitiated {
        transfer_id: String,
        parcel_id: String,
        from_owner: String,
        to_owner: String,
        transfer_type: TransferType,
    },
    TransferRejected {
        transfer_id: String,
        parcel_id: String,
        rejected_by: String,
    },
    TransferCancelled {
        transfer_id: String,
        parcel_id: String,
    },
    OwnershipChanged {
        transfer_id: String,
        parcel_id: String,
        previous_owner: String,
        new_owner: String,
        approved_by: String,
    },
}

/// Event bus for broadcasting registry events
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RegistryEvent) {
        trace!(event = ?event, "Emitting registry event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::ParcelRegistered {
            parcel_id, owner, ..
        } => {
            info!(parcel_id = %parcel_id, owner = %owner, "Parcel registered");
        }
        RegistryEvent::ParcelVerified {
            parcel_id,
            decision,
            verified_by,
        } => {
            info!(
                parcel_id = %parcel_id,
                decision = decision.as_str(),
                verified_by = %verified_by,
                "Parcel verification recorded"
            );
        }
        RegistryEvent::ParcelDeactivated { parcel_id, .. } => {
            info!(parcel_id = %parcel_id, "Parcel deactivated");
        }
        RegistryEvent::TransferInitiated {
            transfer_id,
            parcel_id,
            to_owner,
            ..
        } => {
            info!(
                transfer_id = %transfer_id,
                parcel_id = %parcel_id,
                to_owner = %to_owner,
                "Transfer initiated"
            );
        }
        RegistryEvent::OwnershipChanged {
            transfer_id,
            parcel_id,
            previous_owner,
            new_owner,
            ..
        } => {
            info!(
                transfer_id = %transfer_id,
                parcel_id = %parcel_id,
                from = %previous_owner,
                to = %new_owner,
                "Ownership changed"
            );
        }
        _ => {
            debug!(event = ?event, "Registry event");
        }
    }
}

/// Spawn a background task that mirrors all events to the log
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
