//! Cart error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No identity is resolved; the caller should send the user to sign in.
    #[error("not signed in")]
    NotAuthenticated,

    /// Quantity below one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Size or color not selected.
    #[error("size and color are required")]
    MissingVariant,

    /// Requested quantity is above the stock known from the last snapshot.
    #[error("requested {requested} but only {available} in stock")]
    ExceedsStock { requested: u32, available: u32 },

    /// The identity changed while the request was in flight; its response
    /// was discarded.
    #[error("session changed while the request was in flight")]
    SessionChanged,

    /// The cart service refused the request or could not be reached.
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl CartError {
    pub(crate) fn rejected(source: ApiError, fallback: &str) -> Self {
        let message = source.server_message().unwrap_or(fallback).to_owned();
        Self::Rejected { message, source }
    }

    /// Whether this error was raised before any request was sent.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuantity | Self::MissingVariant | Self::ExceedsStock { .. }
        )
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please sign in to add items to your cart".to_string(),
            Self::InvalidQuantity => "Quantity must be at least 1".to_string(),
            Self::MissingVariant => "Please select size and color".to_string(),
            Self::ExceedsStock { available, .. } => format!("Only {available} left in stock"),
            Self::SessionChanged => "Your session changed. Please try again.".to_string(),
            Self::Rejected { message, .. } => message.clone(),
        }
    }
}
