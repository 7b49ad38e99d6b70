//! Parcel routes
//!
//! - `POST   /parcels`                         register (official/admin)
//! - `GET    /parcels?q=&city=&minArea=...`    public search
//! - `GET    /parcels/{id}`                    public record
//! - `PUT    /parcels/{id}`                    descriptive update (official/admin)
//! - `DELETE /parcels/{id}`                    soft delete (admin)
//! - `PUT    /parcels/{id}/verify`             verification decision (official/admin)
//! - `POST   /parcels/{id}/documents`          attach document (owner/official/admin)
//! - `GET    /parcels/{id}/history`            ownership timeline
//! - `GET    /parcels/{id}/transfers`          transfer history
//! - `GET    /parcels/{id}/pending-transfer`   open transfer or null

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::model::{
    AttachDocumentInput, CreateParcelInput, ParcelQuery, UpdateParcelInput, VerificationStatus,
};
use crate::server::AppState;
use crate::types::Result;

use super::response::{
    created, get_auth_header, method_not_allowed, ok, parse_query, path_segments, read_json,
    respond, route_not_found, success, FullBody,
};

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(alias = "status")]
    decision: VerificationStatus,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedResponse<'a> {
    parcel_id: &'a str,
    deleted: bool,
}

/// Dispatch a request under `/parcels`
pub async fn handle_parcels_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
    path: &str,
) -> Response<FullBody> {
    let rest = path.strip_prefix("/parcels").unwrap_or("");
    respond(route(state, req, path, rest).await)
}

async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
    path: &str,
    rest: &str,
) -> Result<Response<FullBody>> {
    let segments = path_segments(rest)?;
    let method = req.method().clone();
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (method, parts.as_slice()) {
        (Method::GET, []) => search(state, req).await,
        (Method::POST, []) => create(state, req).await,
        (Method::GET, [id]) => Ok(ok(&state.services.parcels.get(id).await?)),
        (Method::PUT, [id]) => update(state, req, id).await,
        (Method::DELETE, [id]) => delete(state, req, id).await,
        (Method::PUT, [id, "verify"]) => verify(state, req, id).await,
        (Method::POST, [id, "documents"]) => attach_document(state, req, id).await,
        (Method::GET, [id, "history"]) => Ok(ok(&state.services.history.ownership(id).await?)),
        (Method::GET, [id, "transfers"]) => Ok(ok(&state
            .services
            .transfers
            .history_for_parcel(id)
            .await?)),
        (Method::GET, [id, "pending-transfer"]) => Ok(ok(&state
            .services
            .transfers
            .pending_for_parcel(id)
            .await?)),
        (_, [] | [_] | [_, "verify" | "documents" | "history" | "transfers" | "pending-transfer"]) => {
            Ok(method_not_allowed())
        }
        _ => Ok(route_not_found(path)),
    }
}

async fn search(state: Arc<AppState>, req: Request<Incoming>) -> Result<Response<FullBody>> {
    let query: ParcelQuery = parse_query(&req)?;
    let parcels = state.services.parcels.search(&query).await?;
    Ok(ok(&parcels))
}

async fn create(state: Arc<AppState>, req: Request<Incoming>) -> Result<Response<FullBody>> {
    let caller = state.jwt.authenticate(get_auth_header(&req))?;
    let input: CreateParcelInput = read_json(req).await?;
    let parcel = state.services.parcels.create(&caller, input).await?;
    Ok(created(&parcel, "Parcel registered"))
}

async fn update(state: Arc<AppState>, req: Request<Incoming>, id: &str) -> Result<Response<FullBody>> {
    let caller = state.jwt.authenticate(get_auth_header(&req))?;
    let input: UpdateParcelInput = read_json(req).await?;
    let parcel = state.services.parcels.update(&caller, id, input).await?;
    Ok(success(hyper::StatusCode::OK, &parcel, Some("Parcel updated")))
}

async fn delete(state: Arc<AppState>, req: Request<Incoming>, id: &str) -> Result<Response<FullBody>> {
    let caller = state.jwt.authenticate(get_auth_header(&req))?;
    state.services.parcels.delete(&caller, id).await?;
    Ok(success(
        hyper::StatusCode::OK,
        &DeletedResponse {
            parcel_id: id,
            deleted: true,
        },
        Some("Parcel deleted"),
    ))
}

async fn verify(state: Arc<AppState>, req: Request<Incoming>, id: &str) -> Result<Response<FullBody>> {
    let caller = state.jwt.authenticate(get_auth_header(&req))?;
    let body: VerifyRequest = read_json(req).await?;
    let parcel = state
        .services
        .parcels
        .verify(&caller, id, body.decision)
        .await?;
    Ok(success(
        hyper::StatusCode::OK,
        &parcel,
        Some("Verification recorded"),
    ))
}

async fn attach_document(
    state: Arc<AppState>,
    req: Request<Incoming>,
    id: &str,
) -> Result<Response<FullBody>> {
    let caller = state.jwt.authenticate(get_auth_header(&req))?;
    let input: AttachDocumentInput = read_json(req).await?;
    let parcel = state
        .services
        .parcels
        .attach_document(&caller, id, input)
        .await?;
    Ok(created(&parcel, "Document attached"))
}
