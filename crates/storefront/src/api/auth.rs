//! Auth endpoints.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use shopfront_core::{Identity, ProfileUpdate};

use super::{ApiClient, ApiError};
use crate::services::auth::{AuthApi, AuthGrant, Credentials, PasswordChange, Registration};

/// Login and registration payload: the identity with the token alongside.
#[derive(Deserialize)]
struct AuthPayload {
    token: String,
    #[serde(flatten)]
    identity: Identity,
}

impl From<AuthPayload> for AuthGrant {
    fn from(payload: AuthPayload) -> Self {
        Self {
            token: SecretString::from(payload.token),
            identity: payload.identity,
        }
    }
}

/// [`AuthApi`] over the REST `auth/*` endpoints.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: ApiClient,
}

impl HttpAuthApi {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all, fields(email = %registration.email))]
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, ApiError> {
        let body = json!({
            "name": registration.name,
            "email": registration.email,
            "password": registration.password.expose_secret(),
        });
        let payload: AuthPayload = self
            .client
            .send_json(Method::POST, "auth/register", &body)
            .await?;
        Ok(payload.into())
    }

    #[instrument(skip_all, fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
        });
        let payload: AuthPayload = self
            .client
            .send_json(Method::POST, "auth/login", &body)
            .await?;
        Ok(payload.into())
    }

    #[instrument(skip_all)]
    async fn profile(&self) -> Result<Identity, ApiError> {
        self.client.get("auth/profile").await
    }

    #[instrument(skip_all)]
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Option<Identity>, ApiError> {
        let body = serde_json::to_value(update)?;
        self.client
            .send_json_optional(Method::PUT, "auth/profile", &body)
            .await
    }

    #[instrument(skip_all)]
    async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let body = json!({
            "currentPassword": change.current.expose_secret(),
            "newPassword": change.new.expose_secret(),
        });
        self.client
            .send_unit(Method::PUT, "auth/change-password", Some(&body))
            .await
    }
}
