//! Uniform response envelope and request helpers
//!
//! Success: `{"success": true, "data": ..., "message"?: ...}`
//! Failure: `{"success": false, "error": "CODE", "message": ...}`

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::{RegistryError, Result};

pub type FullBody = Full<Bytes>;

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    success: bool,
    data: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub fn ok<T: Serialize>(data: &T) -> Response<FullBody> {
    success(StatusCode::OK, data, None)
}

pub fn created<T: Serialize>(data: &T, message: &str) -> Response<FullBody> {
    success(StatusCode::CREATED, data, Some(message))
}

pub fn success<T: Serialize>(
    status: StatusCode,
    data: &T,
    message: Option<&str>,
) -> Response<FullBody> {
    json_response(
        status,
        &SuccessEnvelope {
            success: true,
            data,
            message,
        },
    )
}

/// Translate an error into its envelope; internal detail only goes to the log
pub fn error_response(err: &RegistryError) -> Response<FullBody> {
    if matches!(
        err,
        RegistryError::Storage(_) | RegistryError::Internal(_) | RegistryError::Config(_)
    ) {
        error!(error = %err, code = err.code(), "Request failed");
    }

    json_response(
        err.status_code(),
        &ErrorEnvelope {
            success: false,
            error: err.code(),
            message: err.public_message(),
            retryable: err.is_retryable(),
        },
    )
}

pub fn route_not_found(path: &str) -> Response<FullBody> {
    error_response(&RegistryError::NotFound(format!("No route for {}", path)))
}

pub fn method_not_allowed() -> Response<FullBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorEnvelope {
            success: false,
            error: "METHOD_NOT_ALLOWED",
            message: "Method not allowed".into(),
            retryable: false,
        },
    )
}

/// CORS preflight response
pub fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}

/// Collapse a handler result into a response
pub fn respond(result: Result<Response<FullBody>>) -> Response<FullBody> {
    result.unwrap_or_else(|e| error_response(&e))
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Read and decode a JSON request body
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| RegistryError::Validation(format!("Failed to read body: {}", e)))?
        .to_bytes();

    if body.is_empty() {
        return Err(RegistryError::Validation("Request body is required".into()));
    }
    serde_json::from_slice(&body).map_err(|e| RegistryError::Validation(format!("Invalid JSON: {}", e)))
}

/// Like [`read_json`], but an empty body yields the default value
pub async fn read_json_or_default<T: DeserializeOwned + Default>(req: Request<Incoming>) -> Result<T> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| RegistryError::Validation(format!("Failed to read body: {}", e)))?
        .to_bytes();

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&body).map_err(|e| RegistryError::Validation(format!("Invalid JSON: {}", e)))
}

/// Decode the query string
pub fn parse_query<T: DeserializeOwned + Default>(req: &Request<Incoming>) -> Result<T> {
    match req.uri().query() {
        None | Some("") => Ok(T::default()),
        Some(query) => serde_urlencoded::from_str(query)
            .map_err(|e| RegistryError::Validation(format!("Invalid query: {}", e))),
    }
}

/// Split a path remainder into percent-decoded segments
pub fn path_segments(rest: &str) -> Result<Vec<String>> {
    rest.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .map_err(|_| RegistryError::Validation(format!("Invalid path segment: {}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<FullBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let response = created(&serde_json::json!({ "parcelId": "P1" }), "Parcel registered");
        assert_eq!(response.status(), StatusCode::CREATED);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["parcelId"], "P1");
        assert_eq!(json["message"], "Parcel registered");
    }

    #[tokio::test]
    async fn test_error_envelope_hides_storage_detail() {
        let response = error_response(&RegistryError::Storage("socket reset by 10.1.1.1".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "STORAGE_FAILURE");
        assert_eq!(json["retryable"], true);
        assert!(!json["message"].as_str().unwrap().contains("10.1.1.1"));
    }

    #[tokio::test]
    async fn test_conflict_envelope() {
        let json = body_json(error_response(&RegistryError::Conflict(
            "Parcel P1 already has a transfer in progress".into(),
        )))
        .await;
        assert_eq!(json["error"], "CONFLICT");
        assert!(json.get("retryable").is_none());
    }

    #[test]
    fn test_path_segments_decode() {
        assert_eq!(
            path_segments("/KA%2F001/verify").unwrap(),
            vec!["KA/001".to_string(), "verify".to_string()]
        );
        assert!(path_segments("").unwrap().is_empty());
    }
}
