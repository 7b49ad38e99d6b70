//! Authentication and authorization
//!
//! Provides:
//! - JWT verification (identity + role of the caller)
//! - Role model and the single capability check used by every operation

pub mod jwt;
pub mod policy;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use policy::{authorize, Action, Caller, Resource, Role};
