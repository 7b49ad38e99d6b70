//! HTTP routes for the registry

pub mod health;
pub mod parcels;
pub mod response;
pub mod transfers;

pub use health::{health_check, HealthResponse};
pub use parcels::handle_parcels_request;
pub use response::{error_response, preflight_response, route_not_found, FullBody};
pub use transfers::handle_transfers_request;
