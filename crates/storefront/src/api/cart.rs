//! Cart endpoints.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::instrument;

use shopfront_core::{CartItemId, CartSnapshot};

use super::{ApiClient, ApiError};
use crate::services::cart::{CartApi, NewCartItem};

/// [`CartApi`] over the REST `cart/*` endpoints.
#[derive(Clone)]
pub struct HttpCartApi {
    client: ApiClient,
}

impl HttpCartApi {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

/// Path for an item-scoped endpoint. Ids are opaque, so they are escaped.
fn item_path(action: &str, item_id: &CartItemId) -> String {
    format!("cart/{action}/{}", urlencoding::encode(item_id.as_str()))
}

#[async_trait]
impl CartApi for HttpCartApi {
    #[instrument(skip(self))]
    async fn get(&self) -> Result<CartSnapshot, ApiError> {
        self.client.get("cart").await
    }

    #[instrument(skip(self))]
    async fn add(&self, item: &NewCartItem) -> Result<CartSnapshot, ApiError> {
        let body = serde_json::to_value(item)?;
        self.client.send_json(Method::POST, "cart/add", &body).await
    }

    #[instrument(skip(self))]
    async fn update(&self, item_id: &CartItemId, quantity: u32) -> Result<CartSnapshot, ApiError> {
        let body = json!({ "quantity": quantity });
        self.client
            .send_json(Method::PUT, &item_path("update", item_id), &body)
            .await
    }

    #[instrument(skip(self))]
    async fn remove(&self, item_id: &CartItemId) -> Result<CartSnapshot, ApiError> {
        self.client.delete(&item_path("remove", item_id)).await
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), ApiError> {
        self.client.send_unit(Method::DELETE, "cart/clear", None).await
    }
}
