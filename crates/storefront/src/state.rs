//! Client state container.
//!
//! Owns one session manager and one cart engine wired together, so a host
//! (or a test) builds an isolated instance instead of reaching for globals.

use std::sync::Arc;

use crate::api::{ApiClient, HttpAuthApi, HttpCartApi};
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::services::{AuthApi, CartApi, CartEngine, SessionManager, SessionStatus};
use crate::token::{FileTokenStore, TokenStore};

/// Session and cart state shared across views.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: Option<ClientConfig>,
    client: Option<ApiClient>,
    tokens: Arc<dyn TokenStore>,
    session: SessionManager,
    cart: CartEngine,
}

impl Storefront {
    /// Build a container talking to the REST API in `config`, with the token
    /// persisted at `config.token_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self, AppError> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_path));
        let client = ApiClient::new(&config, tokens.clone())?;

        let auth = Arc::new(HttpAuthApi::new(client.clone()));
        let cart = Arc::new(HttpCartApi::new(client.clone()));

        Ok(Self::assemble(Some(config), Some(client), auth, cart, tokens))
    }

    /// Build a container from arbitrary collaborators.
    #[must_use]
    pub fn from_parts(
        auth: Arc<dyn AuthApi>,
        cart: Arc<dyn CartApi>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self::assemble(None, None, auth, cart, tokens)
    }

    fn assemble(
        config: Option<ClientConfig>,
        client: Option<ApiClient>,
        auth: Arc<dyn AuthApi>,
        cart: Arc<dyn CartApi>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let session = SessionManager::new(auth, tokens.clone());
        let cart = CartEngine::new(cart);
        session.subscribe(Arc::new(cart.clone()));

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                client,
                tokens,
                session,
                cart,
            }),
        }
    }

    /// Resolve the persisted session; the cart follows if it resolves.
    pub async fn init(&self) -> SessionStatus {
        let status = self.inner.session.bootstrap().await;
        tracing::info!(
            authenticated = matches!(status, SessionStatus::Authenticated(_)),
            "Storefront initialized"
        );
        status
    }

    /// Drop the local cart. The persisted token is kept, so the next
    /// [`init`](Self::init) restores the session.
    pub fn teardown(&self) {
        self.inner.cart.reset();
        tracing::debug!("Storefront torn down");
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartEngine {
        &self.inner.cart
    }

    /// The credential store shared by the session and the transport.
    #[must_use]
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    /// Configuration, when built with [`from_config`](Self::from_config).
    #[must_use]
    pub fn config(&self) -> Option<&ClientConfig> {
        self.inner.config.as_ref()
    }

    /// HTTP client, when built with [`from_config`](Self::from_config).
    #[must_use]
    pub fn api_client(&self) -> Option<&ApiClient> {
        self.inner.client.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::*;
    use crate::services::CartPhase;
    use crate::testing::{FakeAuthApi, FakeCartApi, customer};
    use crate::token::MemoryTokenStore;
    use shopfront_core::ProductId;

    fn storefront(token: Option<&str>) -> (Storefront, Arc<FakeAuthApi>, Arc<FakeCartApi>) {
        let tokens = Arc::new(
            token.map_or_else(MemoryTokenStore::new, MemoryTokenStore::with_token),
        );
        let auth = Arc::new(FakeAuthApi::new(tokens.clone()));
        auth.add_user(customer("u1", "a@x.com"), "secret1", Some("tok-ada"));
        let cart = Arc::new(FakeCartApi::new().with_product("p1", "Tee", 20, 5));
        let storefront = Storefront::from_parts(auth.clone(), cart.clone(), tokens);
        (storefront, auth, cart)
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let (a, _, _) = storefront(None);
        let (b, _, _) = storefront(None);

        a.init().await;
        b.init().await;
        a.session().login("a@x.com", SecretString::from("secret1")).await.unwrap();

        assert!(a.session().is_authenticated());
        assert!(!b.session().is_authenticated());
        assert!(a.config().is_none());
        assert!(a.api_client().is_none());
    }

    #[tokio::test]
    async fn test_init_restores_session_and_cart() {
        let (storefront, _, cart_api) = storefront(Some("tok-ada"));

        let status = storefront.init().await;

        assert!(matches!(status, SessionStatus::Authenticated(_)));
        assert_eq!(storefront.cart().phase(), CartPhase::Populated);
        assert_eq!(cart_api.calls(), 1);
    }

    #[tokio::test]
    async fn test_logout_resets_cart() {
        let (storefront, _, _) = storefront(None);
        storefront.init().await;
        storefront
            .session()
            .login("a@x.com", SecretString::from("secret1"))
            .await
            .unwrap();
        storefront
            .cart()
            .add_item(&ProductId::new("p1"), 2, "M", "Blue")
            .await
            .unwrap();
        assert_eq!(storefront.cart().item_count(), 2);

        storefront.session().logout();

        assert!(storefront.session().identity().is_none());
        assert!(storefront.tokens().load().unwrap().is_none());
        assert_eq!(storefront.cart().phase(), CartPhase::Unset);
        assert_eq!(storefront.cart().item_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_keeps_token() {
        let (storefront, _, _) = storefront(Some("tok-ada"));
        storefront.init().await;

        storefront.teardown();

        assert!(storefront.cart().snapshot().is_none());
        let token = storefront.tokens().load().unwrap().unwrap();
        assert_eq!(token.expose_secret(), "tok-ada");
    }

    #[test]
    fn test_from_config_uses_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::for_api_url("http://127.0.0.1:9/api").unwrap();
        config.token_path = dir.path().join("token");

        let storefront = Storefront::from_config(config).unwrap();

        assert!(storefront.tokens().load().unwrap().is_none());
        assert!(storefront.api_client().is_some());
        assert_eq!(
            storefront.config().map(|c| c.endpoint("cart")),
            Some("http://127.0.0.1:9/api/cart".to_string())
        );
    }
}
