//! HTTP transport for the storefront REST API.
//!
//! # Architecture
//!
//! - One shared `reqwest::Client` with a per-request timeout
//! - Every request carries `Authorization: Bearer <token>` when a session
//!   token is persisted; the session manager never builds this header itself
//! - Successful responses use the `{ success, data, message }` envelope;
//!   error responses carry an optional human-readable `message`
//!
//! # Collaborators
//!
//! - [`HttpAuthApi`] - register, login, profile, password change
//! - [`HttpCartApi`] - cart snapshot and mutations

mod auth;
mod cart;

pub use auth::HttpAuthApi;
pub use cart::HttpCartApi;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use thiserror::Error;
use tracing::instrument;

use crate::config::ClientConfig;
use crate::token::TokenStore;

/// Delay before the first retry of an idempotent read. Doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Errors that can occur when calling the storefront API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {}", format_status(.status, .message.as_deref()))]
    Status { status: u16, message: Option<String> },

    /// Response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Success envelope without the expected `data` field.
    #[error("Response contained no data")]
    MissingData,
}

impl ApiError {
    /// Build a status error, e.g. for collaborator fakes.
    #[must_use]
    pub fn status(status: u16, message: Option<&str>) -> Self {
        Self::Status {
            status,
            message: message.map(ToOwned::to_owned),
        }
    }

    /// Human-readable message supplied by the API, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref().filter(|m| !m.trim().is_empty()),
            _ => None,
        }
    }

    /// The credential was missing, invalid or expired.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// The addressed resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Worth retrying for idempotent requests.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::MissingData => false,
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn format_status(status: &u16, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!("{status} - {message}"),
        _ => status.to_string(),
    }
}

/// Success envelope wrapping every API payload.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the storefront REST API.
///
/// Cheap to clone; all clones share one connection pool and token store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                config: config.clone(),
                tokens,
            }),
        })
    }

    /// The token store consulted for outgoing requests.
    #[must_use]
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    /// GET a payload, retrying transient failures up to the configured limit.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut attempt = 0;
        loop {
            match self.execute(Method::GET, path, None).await {
                Ok(text) => return decode_data(&text),
                Err(e) if e.is_transient() && attempt < self.inner.config.read_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient API failure, retrying read"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a request with a JSON body and decode the required `data` payload.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let text = self.execute(method, path, Some(body)).await?;
        decode_data(&text)
    }

    /// Send a request whose response may or may not carry a `data` payload.
    pub(crate) async fn send_json_optional<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>, ApiError> {
        let text = self.execute(method, path, Some(body)).await?;
        decode_optional_data(&text)
    }

    /// DELETE and decode the required `data` payload.
    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let text = self.execute(Method::DELETE, path, None).await?;
        decode_data(&text)
    }

    /// Send a request whose payload is not needed. The envelope is still
    /// checked, so a `success: false` answer is an error.
    pub(crate) async fn send_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        let text = self.execute(method, path, body).await?;
        check_envelope(&text)
    }

    /// Execute a request and return the raw body of a success response.
    #[instrument(skip(self, body))]
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.inner.config.endpoint(path);
        let mut request = self.inner.client.request(method, &url);

        match self.inner.tokens.load() {
            Ok(Some(token)) => request = request.bearer_auth(token.expose_secret()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session token, sending anonymously");
            }
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "API returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_error_message(&response_text),
            });
        }

        tracing::debug!(status = %status, "API request succeeded");
        Ok(response_text)
    }
}

/// Pull the human-readable message out of an error body, if it has one.
fn extract_error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
}

/// Decode an envelope and require its `data` field.
fn decode_data<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    decode_optional_data(body)?.ok_or(ApiError::MissingData)
}

/// Reject a `success: false` envelope without decoding its payload.
fn check_envelope(body: &str) -> Result<(), ApiError> {
    decode_optional_data::<IgnoredAny>(body).map(|_| ())
}

/// Decode an envelope whose `data` field may be absent.
fn decode_optional_data<T: DeserializeOwned>(body: &str) -> Result<Option<T>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse API response"
        );
        ApiError::Parse(e)
    })?;

    // Some endpoints answer 200 with `success: false`
    if envelope.success == Some(false) {
        return Err(ApiError::Status {
            status: 200,
            message: envelope.message,
        });
    }

    Ok(envelope.data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn test_decode_data() {
        let payload: Payload = decode_data(r#"{"success": true, "data": {"value": 7}}"#).unwrap();
        assert_eq!(payload, Payload { value: 7 });
    }

    #[test]
    fn test_decode_data_without_success_flag() {
        let payload: Payload = decode_data(r#"{"data": {"value": 1}}"#).unwrap();
        assert_eq!(payload.value, 1);
    }

    #[test]
    fn test_decode_data_missing() {
        let err = decode_data::<Payload>(r#"{"success": true, "message": "ok"}"#).unwrap_err();
        assert!(matches!(err, ApiError::MissingData));
    }

    #[test]
    fn test_decode_optional_data_empty_body() {
        assert_eq!(decode_optional_data::<Payload>("").unwrap(), None);
        assert_eq!(
            decode_optional_data::<Payload>(r#"{"success": true}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_success_false_is_error() {
        let err =
            decode_data::<Payload>(r#"{"success": false, "message": "Out of stock"}"#).unwrap_err();
        assert_eq!(err.server_message(), Some("Out of stock"));
    }

    #[test]
    fn test_check_envelope() {
        check_envelope("").unwrap();
        check_envelope(r#"{"success": true, "message": "Cart cleared"}"#).unwrap();
        check_envelope(r#"{"success": true, "data": {"items": []}}"#).unwrap();

        let err = check_envelope(r#"{"success": false, "message": "Cart is locked"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 200, .. }));
        assert_eq!(err.server_message(), Some("Cart is locked"));
    }

    #[test]
    fn test_decode_garbage_is_parse_error() {
        let err = decode_data::<Payload>("<html>").unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"success": false, "message": "Invalid credentials"}"#),
            Some("Invalid credentials".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"error": "Not authorized"}"#),
            Some("Not authorized".to_string())
        );
        assert_eq!(extract_error_message(r#"{"message": "  "}"#), None);
        assert_eq!(extract_error_message("Bad Gateway"), None);
    }

    #[test]
    fn test_status_error_display() {
        let err = ApiError::status(401, Some("Token expired"));
        assert_eq!(err.to_string(), "API error: 401 - Token expired");

        let err = ApiError::status(500, None);
        assert_eq!(err.to_string(), "API error: 500");
    }

    #[test]
    fn test_error_classification() {
        assert!(ApiError::status(401, None).is_unauthorized());
        assert!(ApiError::status(404, None).is_not_found());
        assert!(ApiError::status(503, None).is_transient());
        assert!(ApiError::status(429, None).is_transient());
        assert!(!ApiError::status(400, None).is_transient());
        assert!(!ApiError::MissingData.is_transient());
    }
}
