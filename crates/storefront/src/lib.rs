//! Shopfront storefront client library.
//!
//! Session and cart state for a storefront front-end talking to the Shopfront
//! REST API. The [`state::Storefront`] container wires the pieces together:
//!
//! - [`services::SessionManager`] resolves and holds the signed-in identity
//! - [`services::CartEngine`] mirrors that user's server-side cart
//! - [`token`] persists the session token across restarts
//! - [`api`] implements both collaborators over HTTP
//! - [`guard`] gates routes on session state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod token;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use error::AppError;
pub use state::Storefront;
