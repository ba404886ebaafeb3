//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env` file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Root directory for the filesystem blob store.
    pub storage_root: PathBuf,
    /// HS256 secret the identity provider signs bearer tokens with.
    pub auth_token_secret: String,
    /// Upper bound on concurrent live database connections.
    pub db_max_connections: u32,
    /// Bounded wait for a pooled connection; exceeding it fails fast.
    pub db_acquire_timeout: Duration,
    /// Idle connections older than this are recycled.
    pub db_idle_timeout: Duration,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for
    /// development, but this is skipped in test environments to ensure tests
    /// are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Collaborator Settings ---
        let storage_root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storage"));

        let auth_token_secret = std::env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("AUTH_TOKEN_SECRET".to_string()))?;

        // --- Pool Tuning ---
        let db_max_connections = parse_env_or("DB_MAX_CONNECTIONS", 10)?;
        let db_acquire_timeout =
            Duration::from_secs(parse_env_or("DB_ACQUIRE_TIMEOUT_SECS", 5)?);
        let db_idle_timeout = Duration::from_secs(parse_env_or("DB_IDLE_TIMEOUT_SECS", 300)?);

        let max_upload_bytes = parse_env_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            storage_root,
            auth_token_secret,
            db_max_connections,
            db_acquire_timeout,
            db_idle_timeout,
            max_upload_bytes,
        })
    }
}

/// Parses an optional numeric environment variable, falling back to a
/// default when unset.
fn parse_env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_uses_default_when_unset() {
        let value: u32 = parse_env_or("DEFINITELY_NOT_SET_12345", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn parse_env_or_rejects_garbage() {
        std::env::set_var("MEDINTAKE_TEST_BAD_NUMBER", "not-a-number");
        let result: Result<u32, _> = parse_env_or("MEDINTAKE_TEST_BAD_NUMBER", 1);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
        std::env::remove_var("MEDINTAKE_TEST_BAD_NUMBER");
    }
}
