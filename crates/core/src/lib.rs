//! Shopfront Core - Shared domain types.
//!
//! This crate provides the types shared by the storefront client and its tests:
//! - identifiers for users, products, carts and cart lines
//! - the resolved user identity and its closed set of roles
//! - the cart snapshot mirrored from the remote cart service
//! - the pricing rules used by every view that shows cart totals
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no global state. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, roles, identities and carts
//! - [`pricing`] - Shipping, tax and grand-total rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use pricing::PricingSummary;
pub use types::*;
