//! Transfer routes
//!
//! All transfer routes require a bearer token.
//!
//! - `POST /transfers`                 initiate (current owner)
//! - `GET  /transfers`                 the caller's transfers, newest first
//! - `GET  /transfers/pending`         review queue (official/admin)
//! - `GET  /transfers/{id}`            one transfer (parties, official/admin)
//! - `PUT  /transfers/{id}/approve`    approve and complete (official/admin)
//! - `PUT  /transfers/{id}/reject`     reject with reason (official/admin)
//! - `PUT  /transfers/{id}/cancel`     withdraw (initiator)

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Caller;
use crate::model::InitiateTransferInput;
use crate::server::AppState;
use crate::types::{RegistryError, Result};

use super::response::{
    created, get_auth_header, method_not_allowed, ok, parse_query, path_segments, read_json,
    read_json_or_default, respond, route_not_found, success, FullBody,
};

#[derive(Debug, Default, Deserialize)]
struct ApproveRequest {
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    mine: Option<bool>,
}

/// Dispatch a request under `/transfers`
pub async fn handle_transfers_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
    path: &str,
) -> Response<FullBody> {
    let rest = path.strip_prefix("/transfers").unwrap_or("");
    respond(route(state, req, path, rest).await)
}

async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
    path: &str,
    rest: &str,
) -> Result<Response<FullBody>> {
    let segments = path_segments(rest)?;
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
    let method = req.method().clone();

    let known = matches!(
        parts.as_slice(),
        [] | [_] | [_, "approve" | "reject" | "cancel"]
    );
    if !known {
        return Ok(route_not_found(path));
    }
    let caller = state.jwt.authenticate(get_auth_header(&req))?;

    match (method, parts.as_slice()) {
        (Method::POST, []) => initiate(state, req, &caller).await,
        (Method::GET, []) => list_mine(state, req, &caller).await,
        (Method::GET, ["pending"]) => Ok(ok(&state.services.transfers.list_pending(&caller).await?)),
        (Method::GET, [id]) => Ok(ok(&state.services.transfers.get(&caller, id).await?)),
        (Method::PUT, [id, "approve"]) => approve(state, req, &caller, id).await,
        (Method::PUT, [id, "reject"]) => reject(state, req, &caller, id).await,
        (Method::PUT, [id, "cancel"]) => {
            let transfer = state.services.transfers.cancel(&caller, id).await?;
            Ok(success(StatusCode::OK, &transfer, Some("Transfer cancelled")))
        }
        _ => Ok(method_not_allowed()),
    }
}

async fn initiate(
    state: Arc<AppState>,
    req: Request<Incoming>,
    caller: &Caller,
) -> Result<Response<FullBody>> {
    let input: InitiateTransferInput = read_json(req).await?;
    let transfer = state.services.transfers.initiate(caller, input).await?;
    Ok(created(&transfer, "Transfer initiated"))
}

/// `mine` defaults to true; the full review queue lives at `/transfers/pending`
async fn list_mine(
    state: Arc<AppState>,
    req: Request<Incoming>,
    caller: &Caller,
) -> Result<Response<FullBody>> {
    let query: ListQuery = parse_query(&req)?;
    if query.mine == Some(false) {
        return Err(RegistryError::Validation(
            "Use /transfers/pending for the review queue".into(),
        ));
    }
    Ok(ok(&state.services.transfers.list_mine(caller).await?))
}

async fn approve(
    state: Arc<AppState>,
    req: Request<Incoming>,
    caller: &Caller,
    id: &str,
) -> Result<Response<FullBody>> {
    let body: ApproveRequest = read_json_or_default(req).await?;
    let transfer = state
        .services
        .transfers
        .approve(caller, id, body.comment)
        .await?;
    Ok(success(
        StatusCode::OK,
        &transfer,
        Some("Transfer approved and ownership updated"),
    ))
}

async fn reject(
    state: Arc<AppState>,
    req: Request<Incoming>,
    caller: &Caller,
    id: &str,
) -> Result<Response<FullBody>> {
    let body: RejectRequest = read_json(req).await?;
    let transfer = state
        .services
        .transfers
        .reject(caller, id, &body.reason)
        .await?;
    Ok(success(StatusCode::OK, &transfer, Some("Transfer rejected")))
}
