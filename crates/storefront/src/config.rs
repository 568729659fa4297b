//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `SHOPFRONT_API_URL` - Base URL of the REST API (default: `http://localhost:5000/api`)
//! - `SHOPFRONT_TOKEN_PATH` - File holding the session token (default: `.shopfront/token`)
//! - `SHOPFRONT_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SHOPFRONT_READ_RETRIES` - Extra attempts for idempotent reads (default: 0, max: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_TOKEN_PATH: &str = ".shopfront/token";
const DEFAULT_TIMEOUT_SECS: &str = "30";
const MAX_READ_RETRIES: u32 = 5;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash
    pub api_url: Url,
    /// Where the session token is persisted between runs
    pub token_path: PathBuf,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Extra attempts for idempotent reads on transient failures
    pub read_retries: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url.as_str())
            .field("token_path", &self.token_path)
            .field("request_timeout", &self.request_timeout)
            .field("read_retries", &self.read_retries)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(&get_env_or_default("SHOPFRONT_API_URL", DEFAULT_API_URL))?;
        let token_path =
            PathBuf::from(get_env_or_default("SHOPFRONT_TOKEN_PATH", DEFAULT_TOKEN_PATH));
        let request_timeout = parse_request_timeout(&get_env_or_default(
            "SHOPFRONT_REQUEST_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        ))?;
        let read_retries = parse_read_retries(&get_env_or_default("SHOPFRONT_READ_RETRIES", "0"))?;

        Ok(Self {
            api_url,
            token_path,
            request_timeout,
            read_retries,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration pointing at `api_url` with defaults for everything else.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL is not an http(s) URL.
    pub fn for_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            request_timeout: Duration::from_secs(30),
            read_retries: 0,
            sentry_dsn: None,
            sentry_environment: None,
        })
    }

    /// Build the absolute URL for an API path such as `cart/add`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and validate the API base URL.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("SHOPFRONT_API_URL".to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "SHOPFRONT_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            "SHOPFRONT_API_URL".to_string(),
            "must have a host".to_string(),
        ));
    }

    Ok(url)
}

/// Get an optional environment variable, treating empty values as unset.
/// Parse a request timeout in whole seconds. Zero is rejected.
fn parse_request_timeout(raw: &str) -> Result<Duration, ConfigError> {
    const VAR: &str = "SHOPFRONT_REQUEST_TIMEOUT_SECS";

    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(VAR.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            VAR.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse the read retry count, bounded by [`MAX_READ_RETRIES`].
fn parse_read_retries(raw: &str) -> Result<u32, ConfigError> {
    const VAR: &str = "SHOPFRONT_READ_RETRIES";

    let retries = raw
        .trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidEnvVar(VAR.to_string(), e.to_string()))?;
    if retries > MAX_READ_RETRIES {
        return Err(ConfigError::InvalidEnvVar(
            VAR.to_string(),
            format!("must be at most {MAX_READ_RETRIES}"),
        ));
    }
    Ok(retries)
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}
