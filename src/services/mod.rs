//! Service layer
//!
//! Services hold the registry rules between HTTP handlers and the store:
//! - Authorization through the single capability check
//! - Input validation
//! - Building atomic transitions
//! - Event emission for audit/notifications
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! ParcelRegistry / TransferEngine / HistoryLog
//!     ↓
//! RegistryStore (memory | mongo | ledger)
//! ```

pub mod events;
pub mod history;
pub mod parcel_registry;
pub mod transfer_engine;

pub use events::{spawn_logging_listener, EventBus, RegistryEvent};
pub use history::{ownership_timeline, HistoryLog, OwnershipHistory, TimelineEntry};
pub use parcel_registry::ParcelRegistry;
pub use transfer_engine::TransferEngine;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::Caller;
use crate::store::RegistryStore;
use crate::types::RegistryError;

/// Service container for dependency injection
pub struct Services {
    pub parcels: Arc<ParcelRegistry>,
    pub transfers: Arc<TransferEngine>,
    pub history: Arc<HistoryLog>,
    pub events: Arc<EventBus>,
    backend: &'static str,
}

impl Services {
    pub fn new(store: Arc<dyn RegistryStore>, events: Arc<EventBus>, search_limit: usize) -> Self {
        Self {
            parcels: Arc::new(ParcelRegistry::new(
                store.clone(),
                events.clone(),
                search_limit,
            )),
            transfers: Arc::new(TransferEngine::new(store.clone(), events.clone())),
            history: Arc::new(HistoryLog::new(store.clone())),
            events,
            backend: store.backend_name(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }
}

/// Refused preconditions are routine; store trouble is not
pub(crate) fn log_failure(operation: &str, caller: &Caller, err: &RegistryError) {
    match err {
        RegistryError::Storage(_) | RegistryError::NotConfirmed(_) | RegistryError::Internal(_) => {
            warn!(operation, caller = %caller.id, error = %err, "Operation failed");
        }
        _ => {
            debug!(operation, caller = %caller.id, error = %err, "Operation refused");
        }
    }
}
