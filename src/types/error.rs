//! Error types for the land registry
//!
//! Every failure the workflow can produce maps onto one of these kinds, and
//! each kind maps onto exactly one HTTP status.

use hyper::StatusCode;

/// Main error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backing store unavailable; the caller may retry.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Ledger transaction was submitted but never confirmed.
    #[error("Transaction not confirmed: {0}")]
    NotConfirmed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotConfirmed(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_FAILURE",
            Self::NotConfirmed(_) => "NOT_CONFIRMED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can safely retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Message that is safe to hand back to a client.
    ///
    /// Storage and internal errors carry driver detail, which stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) => "Storage temporarily unavailable, please retry".to_string(),
            Self::Config(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotConfirmed(_) => "Ledger transaction was not confirmed".to_string(),
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::PermissionDenied(msg)
            | Self::NotFound(msg)
            | Self::InvalidState(msg)
            | Self::Conflict(msg) => msg.clone(),
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for RegistryError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for RegistryError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bson::ser::Error> for RegistryError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for RegistryError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for RegistryError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
