//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Thirty days, the lifetime of a signed session.
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

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
    /// Public base URL of the service, used to build OAuth redirect URIs.
    pub auth_url: String,
    pub auth_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub session_max_age_secs: u64,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Load Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Authentication Settings ---
        let auth_url = lookup("AUTH_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&auth_url)
            .map_err(|e| ConfigError::InvalidValue("AUTH_URL".to_string(), e.to_string()))?;

        let auth_secret = required("AUTH_SECRET")?;
        let google_client_id = required("GOOGLE_CLIENT_ID")?;
        let google_client_secret = required("GOOGLE_CLIENT_SECRET")?;

        let session_max_age_secs = match lookup("SESSION_MAX_AGE_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("SESSION_MAX_AGE_SECS".to_string(), e.to_string())
            })?,
            None => DEFAULT_SESSION_MAX_AGE_SECS,
        };

        let cors_origin = exact_origin(
            &lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
        )
        .map_err(|reason| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), reason))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            auth_url,
            auth_secret,
            google_client_id,
            google_client_secret,
            session_max_age_secs,
            cors_origin,
        })
    }
}

/// Normalizes a single `scheme://host[:port]` origin.
///
/// Credentialed CORS needs an exact origin, so wildcards, paths and
/// non-HTTP schemes are rejected.
fn exact_origin(raw: &str) -> Result<String, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    let origin = parsed.origin();
    if !origin.is_tuple()
        || !matches!(parsed.scheme(), "http" | "https")
        || parsed.path() != "/"
        || parsed.query().is_some()
        || parsed.fragment().is_some()
        || !parsed.username().is_empty()
    {
        return Err(format!("{} is not an exact origin", raw));
    }
    Ok(origin.ascii_serialization())
}
