//! Liveness probe
//!
//! `/health` and `/healthz` answer 200 whenever the process is serving.
//! The payload names the storage backend so operators can tell a
//! development deployment from a ledger-backed one at a glance.

use hyper::Response;
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

use super::response::{ok, FullBody};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// memory | mongo | ledger
    pub backend: &'static str,
    pub version: &'static str,
    pub uptime: u64,
    pub dev_mode: bool,
    pub timestamp: String,
}

pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    ok(&HealthResponse {
        healthy: true,
        backend: state.services.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        dev_mode: state.args.dev_mode,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
