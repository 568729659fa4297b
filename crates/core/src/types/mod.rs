//! Core types for Shopfront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod identity;
pub mod role;

pub use cart::{CartItem, CartSnapshot, ProductRef};
pub use id::*;
pub use identity::{Identity, ProfileUpdate};
pub use role::{Role, RoleError};
