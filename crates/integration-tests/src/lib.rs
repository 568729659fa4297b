//! Integration tests for Shopfront.
//!
//! The tests drive the real HTTP collaborators of `shopfront-storefront`
//! against [`FakeApi`], an in-process stand-in for the storefront REST API
//! bound to an ephemeral local port. It keeps users, tokens, products and
//! carts in memory and answers with the same envelopes as the real service.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```

#![allow(clippy::indexing_slicing)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use shopfront_core::Role;

// =============================================================================
// Backend State
// =============================================================================

#[derive(Debug, Clone)]
struct User {
    id: String,
    name: String,
    email: String,
    password: String,
    role: Role,
    phone: Option<String>,
}

impl User {
    fn to_json(&self) -> Value {
        let mut value = json!({
            "_id": self.id,
            "name": self.name,
            "email": self.email,
            "role": self.role.as_str(),
        });
        if let Some(phone) = &self.phone {
            value["phone"] = json!(phone);
        }
        value
    }
}

#[derive(Debug, Clone)]
struct Product {
    id: String,
    name: String,
    price: Decimal,
    stock: u32,
}

#[derive(Debug, Clone)]
struct Line {
    id: String,
    product_id: String,
    quantity: u32,
    size: String,
    color: String,
    price: Decimal,
}

#[derive(Default)]
struct Data {
    users: Vec<User>,
    sessions: HashMap<String, String>,
    products: HashMap<String, Product>,
    carts: HashMap<String, Vec<Line>>,
    next_id: usize,
    requests: Vec<String>,
    bearer_tokens: Vec<Option<String>>,
    failures: VecDeque<(StatusCode, Option<String>)>,
    cart_gate: Option<Arc<Notify>>,
}

impl Data {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        let token = self.next_id("tok-");
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }

    fn user_index(&self, token: Option<&str>) -> Option<usize> {
        let user_id = self.sessions.get(token?)?;
        self.users.iter().position(|u| &u.id == user_id)
    }

    fn cart_json(&self, user_id: &str) -> Value {
        let lines = self.carts.get(user_id).map(Vec::as_slice).unwrap_or_default();
        let total: Decimal = lines
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum();

        let items: Vec<Value> = lines
            .iter()
            .map(|line| {
                let product = self.products.get(&line.product_id);
                json!({
                    "_id": line.id,
                    "product": {
                        "_id": line.product_id,
                        "name": product.map(|p| p.name.as_str()).unwrap_or_default(),
                        "images": [],
                        "price": product.and_then(|p| p.price.to_f64()),
                        "stock": product.map_or(0, |p| p.stock),
                    },
                    "quantity": line.quantity,
                    "size": line.size,
                    "color": line.color,
                    "price": line.price.to_f64(),
                })
            })
            .collect();

        json!({
            "_id": format!("cart-{user_id}"),
            "user": user_id,
            "items": items,
            "totalPrice": total.to_f64(),
        })
    }
}

// =============================================================================
// FakeApi
// =============================================================================

/// In-process fake of the storefront REST API.
///
/// Dropping it stops the server.
pub struct FakeApi {
    data: Arc<Mutex<Data>>,
    base_url: String,
    server: JoinHandle<()>,
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeApi {
    /// Start a server on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    #[allow(clippy::expect_used)]
    pub async fn spawn() -> Self {
        let data = Arc::new(Mutex::new(Data::default()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake API listener");
        let addr = listener.local_addr().expect("Listener has no local address");

        let app = router(data.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log_server_error(&format!("fake API stopped: {e}"));
            }
        });

        Self {
            data,
            base_url: format!("http://{addr}/api"),
            server,
        }
    }

    /// Base URL to configure the client with, e.g. `http://127.0.0.1:4312/api`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an account. Returns its id.
    pub fn seed_user(&self, name: &str, email: &str, password: &str, role: Role) -> String {
        let mut data = self.data.lock();
        let id = data.next_id("user-");
        data.users.push(User {
            id: id.clone(),
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
            phone: None,
        });
        id
    }

    /// Issue a token for an existing account, as a previous session would have.
    pub fn issue_token(&self, user_id: &str) -> String {
        self.data.lock().issue_token(user_id)
    }

    /// Add a product to the catalogue.
    pub fn seed_product(&self, id: &str, name: &str, price: i64, stock: u32) {
        self.data.lock().products.insert(
            id.to_string(),
            Product {
                id: id.to_string(),
                name: name.to_string(),
                price: Decimal::from(price),
                stock,
            },
        );
    }

    /// Invalidate every issued token, as if they had expired.
    pub fn revoke_all_tokens(&self) {
        self.data.lock().sessions.clear();
    }

    /// Answer the next request with `status` and an optional message.
    pub fn fail_next(&self, status: u16, message: Option<&str>) {
        self.fail_next_n(status, message, 1);
    }

    /// Answer the next `count` requests with `status` and an optional message.
    pub fn fail_next_n(&self, status: u16, message: Option<&str>, count: usize) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut data = self.data.lock();
        for _ in 0..count {
            data.failures.push_back((status, message.map(ToOwned::to_owned)));
        }
    }

    /// Delay the next cart response until the returned gate is notified.
    pub fn hold_next_cart_response(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.data.lock().cart_gate = Some(gate.clone());
        gate
    }

    /// Requests received so far, as `"METHOD /path"`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.data.lock().requests.clone()
    }

    /// Number of requests whose line starts with `prefix`.
    #[must_use]
    pub fn request_count(&self, prefix: &str) -> usize {
        self.data
            .lock()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    /// Bearer token of the most recent request, if it carried one.
    #[must_use]
    pub fn last_bearer(&self) -> Option<String> {
        self.data.lock().bearer_tokens.last().cloned().flatten()
    }

    /// Server-side quantity units in a user's cart.
    #[must_use]
    pub fn cart_units(&self, user_id: &str) -> u32 {
        self.data
            .lock()
            .carts
            .get(user_id)
            .map_or(0, |lines| lines.iter().map(|l| l.quantity).sum())
    }
}

#[allow(clippy::print_stderr)]
fn log_server_error(message: &str) {
    eprintln!("{message}");
}

// =============================================================================
// Routes
// =============================================================================

type Shared = Arc<Mutex<Data>>;

fn router(data: Shared) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/profile", get(profile).put(update_profile))
        .route("/api/auth/change-password", put(change_password))
        .route("/api/cart", get(get_cart))
        .route("/api/cart/add", post(add_to_cart))
        .route("/api/cart/update/{item_id}", put(update_cart_item))
        .route("/api/cart/remove/{item_id}", delete(remove_cart_item))
        .route("/api/cart/clear", delete(clear_cart))
        .with_state(data)
}

fn success(status: StatusCode, data: Value) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn unauthorized() -> Response {
    reject(StatusCode::UNAUTHORIZED, "Not authorized, token failed")
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(ToOwned::to_owned)
}

/// Record the request and take any injected failure.
fn enter(data: &mut Data, line: String, headers: &HeaderMap) -> Option<Response> {
    data.requests.push(line);
    data.bearer_tokens.push(bearer(headers));
    data.failures.pop_front().map(|(status, message)| match message {
        Some(message) => reject(status, &message),
        None => status.into_response(),
    })
}

#[derive(Deserialize)]
struct RegisterBody {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Response {
    let mut data = data.lock();
    if let Some(failure) = enter(&mut data, "POST /api/auth/register".into(), &headers) {
        return failure;
    }
    if data.users.iter().any(|u| u.email == body.email) {
        return reject(StatusCode::BAD_REQUEST, "User already exists");
    }

    let id = data.next_id("user-");
    let user = User {
        id: id.clone(),
        name: body.name,
        email: body.email,
        password: body.password,
        role: Role::Customer,
        phone: None,
    };
    let mut payload = user.to_json();
    data.users.push(user);
    payload["token"] = json!(data.issue_token(&id));
    success(StatusCode::CREATED, payload)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Response {
    let mut data = data.lock();
    if let Some(failure) = enter(&mut data, "POST /api/auth/login".into(), &headers) {
        return failure;
    }

    let Some(user) = data
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .cloned()
    else {
        return reject(StatusCode::UNAUTHORIZED, "Invalid email or password");
    };

    let mut payload = user.to_json();
    payload["token"] = json!(data.issue_token(&user.id));
    success(StatusCode::OK, payload)
}

async fn profile(State(data): State<Shared>, headers: HeaderMap) -> Response {
    let mut data = data.lock();
    if let Some(failure) = enter(&mut data, "GET /api/auth/profile".into(), &headers) {
        return failure;
    }

    match data.user_index(bearer(&headers).as_deref()) {
        Some(i) => success(StatusCode::OK, data.users[i].to_json()),
        None => unauthorized(),
    }
}

#[derive(Deserialize)]
struct ProfileBody {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

async fn update_profile(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> Response {
    let mut data = data.lock();
    if let Some(failure) = enter(&mut data, "PUT /api/auth/profile".into(), &headers) {
        return failure;
    }
    let Some(i) = data.user_index(bearer(&headers).as_deref()) else {
        return unauthorized();
    };

    let user = &mut data.users[i];
    if let Some(name) = body.name {
        user.name = name;
    }
    if let Some(email) = body.email {
        user.email = email;
    }
    if body.phone.is_some() {
        user.phone = body.phone;
    }
    success(StatusCode::OK, user.to_json())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PasswordBody>,
) -> Response {
    let mut data = data.lock();
    if let Some(failure) = enter(&mut data, "PUT /api/auth/change-password".into(), &headers) {
        return failure;
    }
    let Some(i) = data.user_index(bearer(&headers).as_deref()) else {
        return unauthorized();
    };

    let user = &mut data.users[i];
    if user.password != body.current_password {
        return reject(StatusCode::BAD_REQUEST, "Current password is incorrect");
    }
    user.password = body.new_password;
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Password updated successfully" })),
    )
        .into_response()
}

/// Resolve the caller, run `op` on their cart and deliver the result,
/// honouring any gate set with [`FakeApi::hold_next_cart_response`].
async fn cart_op(
    data: Shared,
    line: String,
    headers: &HeaderMap,
    op: impl FnOnce(&mut Data, &str) -> Response,
) -> Response {
    let (gate, response) = {
        let mut data = data.lock();
        let response = match enter(&mut data, line, headers) {
            Some(failure) => failure,
            None => match data.user_index(bearer(headers).as_deref()) {
                Some(i) => {
                    let user_id = data.users[i].id.clone();
                    op(&mut data, &user_id)
                }
                None => unauthorized(),
            },
        };
        (data.cart_gate.take(), response)
    };

    if let Some(gate) = gate {
        gate.notified().await;
    }
    response
}

async fn get_cart(State(data): State<Shared>, headers: HeaderMap) -> Response {
    cart_op(data, "GET /api/cart".into(), &headers, |data, user_id| {
        success(StatusCode::OK, data.cart_json(user_id))
    })
    .await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    product_id: String,
    quantity: u32,
    size: String,
    color: String,
}

async fn add_to_cart(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Response {
    cart_op(data, "POST /api/cart/add".into(), &headers, move |data, user_id| {
        let Some(product) = data.products.get(&body.product_id).cloned() else {
            return reject(StatusCode::NOT_FOUND, "Product not found");
        };
        let line_id = data.next_id("line-");

        let lines = data.carts.entry(user_id.to_string()).or_default();
        let existing = lines.iter().position(|l| {
            l.product_id == body.product_id && l.size == body.size && l.color == body.color
        });
        let quantity = existing.map_or(0, |i| lines[i].quantity) + body.quantity;
        if quantity > product.stock {
            return reject(StatusCode::BAD_REQUEST, "Insufficient stock");
        }

        match existing {
            Some(i) => lines[i].quantity = quantity,
            None => lines.push(Line {
                id: line_id,
                product_id: product.id,
                quantity,
                size: body.size,
                color: body.color,
                price: product.price,
            }),
        }
        success(StatusCode::OK, data.cart_json(user_id))
    })
    .await
}

#[derive(Deserialize)]
struct UpdateBody {
    quantity: u32,
}

async fn update_cart_item(
    State(data): State<Shared>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> Response {
    let line = format!("PUT /api/cart/update/{item_id}");
    cart_op(data, line, &headers, move |data, user_id| {
        let stock_of = |product_id: &str| data.products.get(product_id).map_or(0, |p| p.stock);
        let Some(line) = data
            .carts
            .get(user_id)
            .and_then(|lines| lines.iter().find(|l| l.id == item_id))
        else {
            return reject(StatusCode::NOT_FOUND, "Item not found");
        };
        if body.quantity > stock_of(&line.product_id) {
            return reject(StatusCode::BAD_REQUEST, "Insufficient stock");
        }

        if let Some(line) = data
            .carts
            .get_mut(user_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.id == item_id))
        {
            line.quantity = body.quantity;
        }
        success(StatusCode::OK, data.cart_json(user_id))
    })
    .await
}

async fn remove_cart_item(
    State(data): State<Shared>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let line = format!("DELETE /api/cart/remove/{item_id}");
    cart_op(data, line, &headers, move |data, user_id| {
        let Some(lines) = data.carts.get_mut(user_id) else {
            return reject(StatusCode::NOT_FOUND, "Item not found");
        };
        let before = lines.len();
        lines.retain(|l| l.id != item_id);
        if lines.len() == before {
            return reject(StatusCode::NOT_FOUND, "Item not found");
        }
        success(StatusCode::OK, data.cart_json(user_id))
    })
    .await
}

async fn clear_cart(State(data): State<Shared>, headers: HeaderMap) -> Response {
    cart_op(data, "DELETE /api/cart/clear".into(), &headers, |data, user_id| {
        data.carts.remove(user_id);
        (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Cart cleared" })),
        )
            .into_response()
    })
    .await
}
