//! Cart pricing rules.
//!
//! Shipping and tax are derived from the server-computed subtotal and are
//! never persisted. Every view that shows totals goes through
//! [`PricingSummary`], so the cart page and the checkout page cannot
//! disagree.
//!
//! All arithmetic uses [`Decimal`], so `tax(s) == s * 0.15` holds exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::types::CartSnapshot;

/// Subtotals strictly above this amount ship for free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::ONE_HUNDRED;

/// Shipping charged when the subtotal does not exceed the threshold.
pub const FLAT_SHIPPING_RATE: Decimal = Decimal::TEN;

/// Sales tax rate applied to the subtotal (15%).
pub const TAX_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// Shipping cost for a subtotal.
#[must_use]
pub fn shipping(subtotal: Decimal) -> Decimal {
    if subtotal > FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING_RATE
    }
}

/// Tax owed on a subtotal.
#[must_use]
pub fn tax(subtotal: Decimal) -> Decimal {
    subtotal * TAX_RATE
}

/// Subtotal plus shipping plus tax.
#[must_use]
pub fn grand_total(subtotal: Decimal) -> Decimal {
    subtotal + shipping(subtotal) + tax(subtotal)
}

/// Format an amount for display, e.g. `$19.99`.
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

/// The derived totals shown next to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

impl PricingSummary {
    /// Derive all totals from a subtotal.
    #[must_use]
    pub fn for_subtotal(subtotal: Decimal) -> Self {
        Self {
            subtotal,
            shipping: shipping(subtotal),
            tax: tax(subtotal),
            grand_total: grand_total(subtotal),
        }
    }

    /// Derive all totals from a cart's authoritative `total_price`.
    #[must_use]
    pub fn for_cart(cart: &CartSnapshot) -> Self {
        Self::for_subtotal(cart.total_price)
    }

    /// Whether the order qualifies for free shipping.
    #[must_use]
    pub fn ships_free(&self) -> bool {
        self.shipping.is_zero()
    }
}
