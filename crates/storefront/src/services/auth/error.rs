//! Authentication error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::token::TokenStoreError;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The auth service refused the request.
    ///
    /// `message` is the service's own explanation when it sent one, otherwise
    /// a generic message for the operation.
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: ApiError,
    },

    /// Input failed client-side validation; no request was sent.
    #[error("{0}")]
    Invalid(String),

    /// The operation needs a resolved identity.
    #[error("not signed in")]
    NotAuthenticated,

    /// The session token could not be persisted.
    #[error("token storage error: {0}")]
    TokenStore(#[from] TokenStoreError),
}

impl AuthError {
    /// Wrap a collaborator failure, preferring the service's message.
    pub(crate) fn rejected(source: ApiError, fallback: &str) -> Self {
        let message = source.server_message().unwrap_or(fallback).to_owned();
        Self::Rejected { message, source }
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } | Self::Invalid(message) => message.clone(),
            Self::NotAuthenticated => "Please sign in to continue".to_string(),
            Self::TokenStore(_) => "Could not save your session. Please try again.".to_string(),
        }
    }

    /// The underlying collaborator failure, if any.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }
}
