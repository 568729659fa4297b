//! Cart engine.
//!
//! Mirrors the server-authoritative cart of the signed-in user. Every
//! successful operation replaces the local snapshot with the one the cart
//! service returned; a failed operation leaves it untouched.
//!
//! # Stale responses
//!
//! Requests are not serialized, so responses can arrive out of order or after
//! the user has signed out. Each request carries a [`Ticket`]:
//!
//! - `generation` changes on every identity transition. A response for an
//!   older generation is dropped and its caller gets
//!   [`CartError::SessionChanged`].
//! - `seq` increases per request. A response is applied only if no response
//!   to a newer request has been applied yet.

mod error;

pub use error::CartError;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::instrument;

use shopfront_core::{CartItemId, CartSnapshot, Identity, PricingSummary, ProductId, UserId};

use crate::api::ApiError;
use crate::error::add_breadcrumb;
use crate::services::auth::SessionListener;

const LOAD_FAILED: &str = "Failed to load cart";
const ADD_FAILED: &str = "Failed to add to cart";
const UPDATE_FAILED: &str = "Failed to update cart";
const REMOVE_FAILED: &str = "Failed to remove item";
const CLEAR_FAILED: &str = "Failed to clear cart";

// =============================================================================
// Collaborator Contract
// =============================================================================

/// Line to add to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
}

/// The remote cart service. Every call acts on the signed-in user's cart.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Fetch the current cart.
    async fn get(&self) -> Result<CartSnapshot, ApiError>;

    /// Add a line (or merge into a matching one).
    async fn add(&self, item: &NewCartItem) -> Result<CartSnapshot, ApiError>;

    /// Set the quantity of an existing line.
    async fn update(&self, item_id: &CartItemId, quantity: u32) -> Result<CartSnapshot, ApiError>;

    /// Remove a line.
    async fn remove(&self, item_id: &CartItemId) -> Result<CartSnapshot, ApiError>;

    /// Remove every line.
    async fn clear(&self) -> Result<(), ApiError>;
}

// =============================================================================
// Engine State
// =============================================================================

/// Lifecycle of the local cart mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartPhase {
    /// No cart: nobody is signed in, or the first fetch has not started.
    #[default]
    Unset,
    /// The first fetch for the current identity is in flight.
    Loading,
    /// Holds the latest server snapshot.
    Populated,
    /// The latest applied operation failed. Any earlier snapshot is kept.
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    seq: u64,
}

#[derive(Debug, Default)]
struct CartState {
    owner: Option<UserId>,
    snapshot: Option<CartSnapshot>,
    phase: CartPhase,
    in_flight: usize,
    generation: u64,
    issued: u64,
    applied: u64,
}

impl CartState {
    fn detach(&mut self, owner: Option<UserId>) {
        self.owner = owner;
        self.snapshot = None;
        self.phase = CartPhase::Unset;
        self.in_flight = 0;
        self.generation += 1;
        self.applied = self.issued;
    }
}

// =============================================================================
// CartEngine
// =============================================================================

/// Client-side mirror of the signed-in user's cart.
///
/// Cheap to clone; clones share state. Register it with
/// [`SessionManager::subscribe`](crate::services::SessionManager::subscribe)
/// so it follows sign-in and sign-out.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: Arc<dyn CartApi>,
    state: RwLock<CartState>,
}

impl CartEngine {
    #[must_use]
    pub fn new(api: Arc<dyn CartApi>) -> Self {
        Self {
            inner: Arc::new(CartInner {
                api,
                state: RwLock::new(CartState::default()),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The last applied snapshot. `None` while unset.
    #[must_use]
    pub fn snapshot(&self) -> Option<CartSnapshot> {
        self.inner.state.read().snapshot.clone()
    }

    #[must_use]
    pub fn phase(&self) -> CartPhase {
        self.inner.state.read().phase
    }

    /// Whether any cart request is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.read().in_flight > 0
    }

    /// Total units across all lines; 0 when unset.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.inner
            .state
            .read()
            .snapshot
            .as_ref()
            .map_or(0, CartSnapshot::item_count)
    }

    /// Shipping, tax and grand total for the current snapshot.
    ///
    /// An unset cart prices as empty.
    #[must_use]
    pub fn pricing(&self) -> PricingSummary {
        let state = self.inner.state.read();
        state.snapshot.as_ref().map_or_else(
            || PricingSummary::for_cart(&CartSnapshot::empty()),
            PricingSummary::for_cart,
        )
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fetch the cart from the service.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session,
    /// `CartError::SessionChanged` if the identity changed meanwhile, or
    /// `CartError::Rejected` if the fetch failed.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<CartSnapshot, CartError> {
        let ticket = self.begin(true)?;
        match self.inner.api.get().await {
            Ok(snapshot) => self.commit(ticket, snapshot),
            Err(e) => Err(self.fail(ticket, e, LOAD_FAILED)),
        }
    }

    /// Add `quantity` units of a product variant.
    ///
    /// # Errors
    ///
    /// Returns a validation error (no request sent) for a zero quantity or a
    /// blank size or color, `CartError::NotAuthenticated` without a session,
    /// and otherwise the same errors as [`load`](Self::load).
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        size: &str,
        color: &str,
    ) -> Result<CartSnapshot, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }
        let (size, color) = (size.trim(), color.trim());
        if size.is_empty() || color.is_empty() {
            return Err(CartError::MissingVariant);
        }

        let item = NewCartItem {
            product_id: product_id.clone(),
            quantity,
            size: size.to_owned(),
            color: color.to_owned(),
        };

        let ticket = self.begin(false)?;
        let snapshot = match self.inner.api.add(&item).await {
            Ok(snapshot) => self.commit(ticket, snapshot)?,
            Err(e) => return Err(self.fail(ticket, e, ADD_FAILED)),
        };

        add_breadcrumb(
            "cart",
            "Added item to cart",
            Some(&[("product_id", product_id.as_str()), ("size", size), ("color", color)]),
        );
        Ok(snapshot)
    }

    /// Set the quantity of a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for zero and
    /// `CartError::ExceedsStock` when the current snapshot shows less stock;
    /// neither sends a request. Otherwise the same errors as
    /// [`load`](Self::load).
    #[instrument(skip(self))]
    pub async fn set_item_quantity(
        &self,
        item_id: &CartItemId,
        quantity: u32,
    ) -> Result<CartSnapshot, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }
        self.check_stock(item_id, quantity)?;

        let ticket = self.begin(false)?;
        match self.inner.api.update(item_id, quantity).await {
            Ok(snapshot) => self.commit(ticket, snapshot),
            Err(e) => Err(self.fail(ticket, e, UPDATE_FAILED)),
        }
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load). Removing a line that is already gone is
    /// rejected by the service.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: &CartItemId) -> Result<CartSnapshot, CartError> {
        let ticket = self.begin(false)?;
        let snapshot = match self.inner.api.remove(item_id).await {
            Ok(snapshot) => self.commit(ticket, snapshot)?,
            Err(e) => return Err(self.fail(ticket, e, REMOVE_FAILED)),
        };

        add_breadcrumb("cart", "Removed item from cart", Some(&[("item_id", item_id.as_str())]));
        Ok(snapshot)
    }

    /// Empty the cart. On success the local cart is empty with a zero total.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartSnapshot, CartError> {
        let ticket = self.begin(false)?;
        match self.inner.api.clear().await {
            Ok(()) => {
                let snapshot = self.commit(ticket, CartSnapshot::empty())?;
                add_breadcrumb("cart", "Cleared cart", None);
                Ok(snapshot)
            }
            Err(e) => Err(self.fail(ticket, e, CLEAR_FAILED)),
        }
    }

    /// Drop the local cart and ignore responses still in flight.
    pub fn reset(&self) {
        self.inner.state.write().detach(None);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_stock(&self, item_id: &CartItemId, quantity: u32) -> Result<(), CartError> {
        let state = self.inner.state.read();
        let available = state
            .snapshot
            .as_ref()
            .and_then(|cart| cart.find_item(item_id))
            .map(|item| item.product.stock);

        match available {
            Some(available) if quantity > available => Err(CartError::ExceedsStock {
                requested: quantity,
                available,
            }),
            _ => Ok(()),
        }
    }

    fn begin(&self, fetch: bool) -> Result<Ticket, CartError> {
        let mut state = self.inner.state.write();
        if state.owner.is_none() {
            return Err(CartError::NotAuthenticated);
        }

        state.issued += 1;
        state.in_flight += 1;
        if fetch && state.snapshot.is_none() {
            state.phase = CartPhase::Loading;
        }

        Ok(Ticket {
            generation: state.generation,
            seq: state.issued,
        })
    }

    fn commit(&self, ticket: Ticket, snapshot: CartSnapshot) -> Result<CartSnapshot, CartError> {
        let mut state = self.inner.state.write();
        if ticket.generation != state.generation {
            tracing::debug!(seq = ticket.seq, "Discarding cart response from a previous session");
            return Err(CartError::SessionChanged);
        }

        state.in_flight = state.in_flight.saturating_sub(1);
        if ticket.seq > state.applied {
            state.applied = ticket.seq;
            state.snapshot = Some(snapshot.clone());
            state.phase = CartPhase::Populated;
            tracing::debug!(
                seq = ticket.seq,
                items = snapshot.item_count(),
                "Cart snapshot applied"
            );
        } else {
            tracing::debug!(
                seq = ticket.seq,
                applied = state.applied,
                "Cart response superseded by a newer one, not applied"
            );
        }

        Ok(snapshot)
    }

    fn fail(&self, ticket: Ticket, error: ApiError, fallback: &str) -> CartError {
        let mut state = self.inner.state.write();
        if ticket.generation != state.generation {
            tracing::debug!(
                seq = ticket.seq,
                error = %error,
                "Ignoring cart failure from a previous session"
            );
            return CartError::SessionChanged;
        }

        state.in_flight = state.in_flight.saturating_sub(1);
        if ticket.seq > state.applied {
            state.phase = CartPhase::Failed;
        }
        drop(state);

        tracing::warn!(seq = ticket.seq, error = %error, "Cart request failed");
        CartError::rejected(error, fallback)
    }
}

#[async_trait]
impl SessionListener for CartEngine {
    async fn signed_in(&self, identity: &Identity) {
        self.inner.state.write().detach(Some(identity.id.clone()));

        if let Err(e) = self.load().await {
            tracing::warn!(user_id = %identity.id, error = %e, "Initial cart fetch failed");
        }
    }

    fn signed_out(&self) {
        self.reset();
        tracing::debug!("Cart detached after sign-out");
    }
}
