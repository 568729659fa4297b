//! Unified error handling with Sentry integration.
//!
//! Provides an `AppError` umbrella over the per-layer errors so a host can
//! handle every failure in one place, plus helpers that keep the Sentry scope
//! in step with the signed-in user.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::token::TokenStoreError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Transport or API failure outside a session or cart operation.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Token persistence failed.
    #[error("Token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    /// Session operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),
}

impl AppError {
    /// Message suitable for showing to the user.
    ///
    /// Session and cart errors carry their own message; anything else shows
    /// `fallback` unless the API supplied a message.
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Auth(err) => err.user_message(),
            Self::Cart(err) => err.user_message(),
            Self::Api(err) => err.server_message().unwrap_or(fallback).to_string(),
            Self::Config(_) | Self::TokenStore(_) => fallback.to_string(),
        }
    }

    /// Whether this is a local fault worth reporting rather than a user or
    /// service outcome.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::TokenStore(_))
    }

    /// Log the error and capture internal faults to Sentry.
    pub fn report(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::warn!(error = %self, "Storefront operation failed");
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a user action.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item to cart", Some(&[("product_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data.unwrap_or_default() {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
