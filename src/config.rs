//! Configuration for the land registry
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::JwtValidator;
use crate::types::{RegistryError, Result};

/// Where registry state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Process memory; lost on restart
    Memory,
    /// MongoDB replica set (transactions required)
    Mongo,
    /// Registry contract on the simulated ledger
    Ledger,
}

/// Land registry - parcel records and ownership transfers
#[derive(Parser, Debug, Clone)]
#[command(name = "land-registry")]
#[command(about = "Land parcel registry with an official-approved transfer workflow")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Storage backend
    #[arg(long, env = "BACKEND", value_enum, default_value = "memory")]
    pub backend: Backend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "land_registry")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Enable development mode (fixed public JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Maximum results returned by parcel search
    #[arg(long, env = "SEARCH_LIMIT", default_value = "50")]
    pub search_limit: usize,

    /// Confirmations required before a ledger write counts as committed
    #[arg(long, env = "LEDGER_CONFIRMATIONS", default_value = "1")]
    pub ledger_confirmations: u64,

    /// How long to wait for a ledger receipt, in milliseconds
    #[arg(long, env = "LEDGER_RECEIPT_TIMEOUT_MS", default_value = "5000")]
    pub ledger_receipt_timeout_ms: u64,

    /// Account granted the admin role at ledger genesis
    #[arg(long, env = "LEDGER_ADMIN", default_value = "registry-admin")]
    pub ledger_admin: String,

    /// Accounts granted the official role at ledger genesis (comma-separated)
    #[arg(long, env = "LEDGER_OFFICIALS", value_delimiter = ',')]
    pub ledger_officials: Vec<String>,

    /// Capacity of the registry event bus
    #[arg(long, env = "EVENT_BUS_CAPACITY", default_value = "1024")]
    pub event_bus_capacity: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.as_deref().map_or(true, str::is_empty) {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.search_limit == 0 {
            return Err("SEARCH_LIMIT must be at least 1".to_string());
        }

        if self.event_bus_capacity == 0 {
            return Err("EVENT_BUS_CAPACITY must be at least 1".to_string());
        }

        if self.backend == Backend::Ledger {
            if self.ledger_confirmations == 0 {
                return Err("LEDGER_CONFIRMATIONS must be at least 1".to_string());
            }
            if self.ledger_admin.trim().is_empty() {
                return Err("LEDGER_ADMIN is required for the ledger backend".to_string());
            }
        }

        Ok(())
    }

    pub fn jwt_validator(&self) -> Result<JwtValidator> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) if !secret.is_empty() => {
                JwtValidator::new(secret.clone(), self.jwt_expiry_seconds)
            }
            (_, true) => Ok(JwtValidator::new_dev()),
            _ => Err(RegistryError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    pub fn ledger_receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_receipt_timeout_ms)
    }

    /// Official accounts with blanks dropped
    pub fn ledger_official_accounts(&self) -> impl Iterator<Item = &str> {
        self.ledger_officials
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["land-registry"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_production_requires_secret() {
        let args = parse(&[]);
        if !args.dev_mode && args.jwt_secret.is_none() {
            assert!(args.validate().is_err());
            assert!(args.jwt_validator().is_err());
        }
    }

    #[test]
    fn test_dev_mode_uses_dev_validator() {
        let args = parse(&["--dev-mode", "--backend", "memory"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_validator().is_ok());
    }

    #[test]
    fn test_ledger_needs_confirmations() {
        let args = parse(&[
            "--dev-mode",
            "--backend",
            "ledger",
            "--ledger-confirmations",
            "0",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_officials_list() {
        let args = parse(&["--ledger-officials", "off-1, off-2,,"]);
        let officials: Vec<&str> = args.ledger_official_accounts().collect();
        assert_eq!(officials, ["off-1", "off-2"]);
    }
}
