//! Client-side services.
//!
//! # Services
//!
//! - `auth` - Session manager: token bootstrap, login, registration, logout,
//!   profile maintenance and role checks
//! - `cart` - Cart engine: mirrors the remote cart for the signed-in user and
//!   performs mutations against it

pub mod auth;
pub mod cart;

pub use auth::{AuthApi, AuthError, SessionListener, SessionManager, SessionStatus};
pub use cart::{CartApi, CartEngine, CartError, CartPhase, NewCartItem};
