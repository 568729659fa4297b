//! In-memory collaborators for unit tests.
//!
//! Both fakes compute their answer as soon as they are called. A gate from
//! `gate_profile`/`hold_next` only delays delivery, which is how a slow
//! network looks to the caller.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use shopfront_core::{
    CartItem, CartItemId, CartSnapshot, Identity, ProductId, ProductRef, ProfileUpdate, Role,
    UserId,
};

use crate::api::ApiError;
use crate::services::auth::{AuthApi, AuthGrant, Credentials, PasswordChange, Registration};
use crate::services::cart::{CartApi, NewCartItem};
use crate::services::SessionListener;
use crate::token::TokenStore;

pub fn customer(id: &str, email: &str) -> Identity {
    Identity {
        id: UserId::new(id),
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        role: Role::Customer,
        phone: None,
    }
}

pub fn admin(id: &str, email: &str) -> Identity {
    Identity {
        role: Role::Admin,
        ..customer(id, email)
    }
}

/// Let spawned tasks run up to their next suspension point.
pub async fn settle_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn deliver<T>(gate: Option<Arc<Notify>>, result: T) -> T {
    if let Some(gate) = gate {
        gate.notified().await;
    }
    result
}

// =============================================================================
// Auth
// =============================================================================

struct FakeUser {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct AuthState {
    users: Vec<FakeUser>,
    sessions: HashMap<String, UserId>,
    issued: usize,
    profile_failure: Option<ApiError>,
    login_failure: Option<ApiError>,
    profile_gate: Option<Arc<Notify>>,
    silent_updates: bool,
}

/// Auth service keyed by the token in the shared store, like the real one.
pub struct FakeAuthApi {
    tokens: Arc<dyn TokenStore>,
    state: Mutex<AuthState>,
    profile_calls: AtomicUsize,
    login_calls: AtomicUsize,
    change_password_calls: AtomicUsize,
}

impl FakeAuthApi {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            tokens,
            state: Mutex::new(AuthState::default()),
            profile_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            change_password_calls: AtomicUsize::new(0),
        }
    }

    /// Register an account, optionally with an already issued token.
    pub fn add_user(&self, identity: Identity, password: &str, token: Option<&str>) {
        let mut state = self.state.lock();
        if let Some(token) = token {
            state.sessions.insert(token.to_string(), identity.id.clone());
        }
        state.users.push(FakeUser {
            identity,
            password: password.to_string(),
        });
    }

    pub fn fail_profile_with(&self, error: ApiError) {
        self.state.lock().profile_failure = Some(error);
    }

    pub fn fail_login_with(&self, error: ApiError) {
        self.state.lock().login_failure = Some(error);
    }

    /// Hold the next profile response until the returned gate is notified.
    pub fn gate_profile(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().profile_gate = Some(gate.clone());
        gate
    }

    /// Whether profile updates answer with the updated record.
    pub fn set_echo_profile_updates(&self, echo: bool) {
        self.state.lock().silent_updates = !echo;
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn change_password_calls(&self) -> usize {
        self.change_password_calls.load(Ordering::SeqCst)
    }

    fn issue(state: &mut AuthState, user_id: &UserId) -> SecretString {
        state.issued += 1;
        let token = format!("tok-{user_id}-{}", state.issued);
        state.sessions.insert(token.clone(), user_id.clone());
        SecretString::from(token)
    }

    /// Index of the user behind the current bearer token.
    fn current_user(&self, state: &AuthState) -> Result<usize, ApiError> {
        let unauthorized = || ApiError::status(401, Some("Not authorized, token failed"));
        let token = self.tokens.load().unwrap().ok_or_else(unauthorized)?;
        let user_id = state
            .sessions
            .get(token.expose_secret())
            .ok_or_else(unauthorized)?;
        state
            .users
            .iter()
            .position(|u| &u.identity.id == user_id)
            .ok_or_else(unauthorized)
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, ApiError> {
        let mut state = self.state.lock();
        if state.users.iter().any(|u| u.identity.email == registration.email) {
            return Err(ApiError::status(400, Some("User already exists")));
        }

        let identity = Identity {
            id: UserId::new(format!("u{}", state.users.len() + 1)),
            name: registration.name.clone(),
            email: registration.email.clone(),
            role: Role::Customer,
            phone: None,
        };
        let token = Self::issue(&mut state, &identity.id);
        state.users.push(FakeUser {
            identity: identity.clone(),
            password: registration.password.expose_secret().to_string(),
        });
        Ok(AuthGrant { token, identity })
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(error) = state.login_failure.take() {
            return Err(error);
        }

        let identity = state
            .users
            .iter()
            .find(|u| {
                u.identity.email == credentials.email
                    && u.password == credentials.password.expose_secret()
            })
            .map(|u| u.identity.clone())
            .ok_or_else(|| ApiError::status(401, Some("Invalid email or password")))?;
        let token = Self::issue(&mut state, &identity.id);
        Ok(AuthGrant { token, identity })
    }

    async fn profile(&self) -> Result<Identity, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let (gate, result) = {
            let mut state = self.state.lock();
            let result = match state.profile_failure.take() {
                Some(error) => Err(error),
                None => self
                    .current_user(&state)
                    .map(|i| state.users[i].identity.clone()),
            };
            (state.profile_gate.take(), result)
        };
        deliver(gate, result).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Option<Identity>, ApiError> {
        let mut state = self.state.lock();
        let index = self.current_user(&state)?;
        update.apply_to(&mut state.users[index].identity);
        let updated = state.users[index].identity.clone();
        Ok((!state.silent_updates).then_some(updated))
    }

    async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.change_password_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let index = self.current_user(&state)?;
        let user = &mut state.users[index];
        if user.password != change.current.expose_secret() {
            return Err(ApiError::status(400, Some("Current password is incorrect")));
        }
        user.password = change.new.expose_secret().to_string();
        Ok(())
    }
}

/// Listener that records the transitions it hears about.
#[derive(Default)]
pub struct RecordingListener {
    signed_in: Mutex<Vec<String>>,
    signed_out: AtomicUsize,
}

impl RecordingListener {
    pub fn signed_in_ids(&self) -> Vec<String> {
        self.signed_in.lock().clone()
    }

    pub fn signed_in_count(&self) -> usize {
        self.signed_in.lock().len()
    }

    pub fn signed_out_count(&self) -> usize {
        self.signed_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn signed_in(&self, identity: &Identity) {
        self.signed_in.lock().push(identity.id.to_string());
    }

    fn signed_out(&self) {
        self.signed_out.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Default)]
struct CartStore {
    products: HashMap<ProductId, ProductRef>,
    cart: CartSnapshot,
    lines: usize,
    failure: Option<ApiError>,
    gate: Option<Arc<Notify>>,
}

impl CartStore {
    fn recompute_total(&mut self) {
        self.cart.total_price = self.cart.items.iter().map(CartItem::line_total).sum();
    }

    fn line_index(&self, item_id: &CartItemId) -> Result<usize, ApiError> {
        self.cart
            .items
            .iter()
            .position(|item| &item.id == item_id)
            .ok_or_else(|| ApiError::status(404, Some("Item not found")))
    }

    fn add(&mut self, new: &NewCartItem) -> Result<CartSnapshot, ApiError> {
        let product = self
            .products
            .get(&new.product_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, Some("Product not found")))?;

        let existing = self.cart.items.iter().position(|item| {
            item.product.id == new.product_id && item.size == new.size && item.color == new.color
        });
        let quantity = existing.map_or(0, |i| self.cart.items[i].quantity) + new.quantity;
        if quantity > product.stock {
            return Err(ApiError::status(400, Some("Insufficient stock")));
        }

        match existing {
            Some(i) => self.cart.items[i].quantity = quantity,
            None => {
                self.lines += 1;
                self.cart.items.push(CartItem {
                    id: CartItemId::new(format!("line-{}", self.lines)),
                    price: product.price.unwrap_or_default(),
                    product,
                    quantity,
                    size: new.size.clone(),
                    color: new.color.clone(),
                });
            }
        }
        self.recompute_total();
        Ok(self.cart.clone())
    }

    fn update(&mut self, item_id: &CartItemId, quantity: u32) -> Result<CartSnapshot, ApiError> {
        let index = self.line_index(item_id)?;
        if quantity > self.cart.items[index].product.stock {
            return Err(ApiError::status(400, Some("Insufficient stock")));
        }
        self.cart.items[index].quantity = quantity;
        self.recompute_total();
        Ok(self.cart.clone())
    }

    fn remove(&mut self, item_id: &CartItemId) -> Result<CartSnapshot, ApiError> {
        let index = self.line_index(item_id)?;
        self.cart.items.remove(index);
        self.recompute_total();
        Ok(self.cart.clone())
    }
}

/// Single-cart service with a product catalogue for stock checks.
#[derive(Default)]
pub struct FakeCartApi {
    store: Mutex<CartStore>,
    calls: AtomicUsize,
}

impl FakeCartApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, id: &str, name: &str, price: i64, stock: u32) -> Self {
        let product = ProductRef {
            id: ProductId::new(id),
            name: name.to_string(),
            images: Vec::new(),
            stock,
            price: Some(Decimal::from(price)),
        };
        self.store.lock().products.insert(product.id.clone(), product);
        self
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ApiError) {
        self.store.lock().failure = Some(error);
    }

    /// Hold the response of the next call until the returned gate is notified.
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.store.lock().gate = Some(gate.clone());
        gate
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call<T>(
        &self,
        op: impl FnOnce(&mut CartStore) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (gate, result) = {
            let mut store = self.store.lock();
            let result = match store.failure.take() {
                Some(error) => Err(error),
                None => op(&mut store),
            };
            (store.gate.take(), result)
        };
        deliver(gate, result).await
    }
}

#[async_trait]
impl CartApi for FakeCartApi {
    async fn get(&self) -> Result<CartSnapshot, ApiError> {
        self.call(|store| Ok(store.cart.clone())).await
    }

    async fn add(&self, item: &NewCartItem) -> Result<CartSnapshot, ApiError> {
        self.call(|store| store.add(item)).await
    }

    async fn update(&self, item_id: &CartItemId, quantity: u32) -> Result<CartSnapshot, ApiError> {
        self.call(|store| store.update(item_id, quantity)).await
    }

    async fn remove(&self, item_id: &CartItemId) -> Result<CartSnapshot, ApiError> {
        self.call(|store| store.remove(item_id)).await
    }

    async fn clear(&self) -> Result<(), ApiError> {
        self.call(|store| {
            store.cart = CartSnapshot::empty();
            Ok(())
        })
        .await
    }
}
