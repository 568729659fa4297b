//! Cart snapshot types.
//!
//! A [`CartSnapshot`] is the authoritative cart as returned by the remote
//! cart service. The client never edits it in place; every successful
//! operation replaces the whole snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CartId, CartItemId, ProductId};

/// Product fields denormalized into a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(rename = "_id")]
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Units currently available. Upper bound for the line quantity.
    #[serde(default)]
    pub stock: u32,
    /// Current catalogue price, which may differ from the line's snapshot price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Line id, stable across quantity updates.
    #[serde(rename = "_id")]
    pub id: CartItemId,
    pub product: ProductRef,
    pub quantity: u32,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    /// Unit price captured when the line was added.
    pub price: Decimal,
}

impl CartItem {
    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Whether the quantity can be raised by one without exceeding stock.
    #[must_use]
    pub const fn can_increment(&self) -> bool {
        self.quantity < self.product.stock
    }

    /// Whether the quantity can be lowered by one without dropping below one.
    #[must_use]
    pub const fn can_decrement(&self) -> bool {
        self.quantity > 1
    }
}

/// Authoritative cart state returned by the cart service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CartId>,
    /// Lines in server insertion order.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Server-computed subtotal. Never recomputed from `items`.
    #[serde(default)]
    pub total_price: Decimal,
}

impl CartSnapshot {
    /// A cart with no lines and a zero total.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            total_price: Decimal::ZERO,
        }
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(item.quantity))
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a line by id.
    #[must_use]
    pub fn find_item(&self, id: &CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }
}

impl Default for CartSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const CART_JSON: &str = r#"{
        "_id": "c1",
        "user": "u1",
        "items": [
            {
                "_id": "line-1",
                "product": {"_id": "p1", "name": "Tee", "images": ["tee.jpg"], "price": 20, "stock": 5},
                "quantity": 2,
                "size": "M",
                "color": "Blue",
                "price": 20
            },
            {
                "_id": "line-2",
                "product": {"_id": "p2", "name": "Cap", "stock": 1},
                "quantity": 1,
                "size": "One Size",
                "color": "Red",
                "price": 15.5
            }
        ],
        "totalPrice": 55.5
    }"#;

    #[test]
    fn test_parse_server_cart() {
        let cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        assert_eq!(cart.id, Some(CartId::new("c1")));
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].product.name, "Tee");
        assert_eq!(cart.items[1].price, Decimal::new(155, 1));
        assert_eq!(cart.total_price, Decimal::new(555, 1));
    }

    #[test]
    fn test_item_count_sums_quantities() {
        let cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        assert_eq!(cart.item_count(), 3);
        assert_eq!(CartSnapshot::empty().item_count(), 0);
    }

    #[test]
    fn test_item_count_saturates() {
        let mut cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        cart.items[0].quantity = u32::MAX;
        assert_eq!(cart.item_count(), u32::MAX);
    }

    #[test]
    fn test_find_item() {
        let cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        let line = cart.find_item(&CartItemId::new("line-2")).unwrap();
        assert_eq!(line.product.id.as_str(), "p2");
        assert!(cart.find_item(&CartItemId::new("missing")).is_none());
    }

    #[test]
    fn test_quantity_bounds() {
        let cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        let tee = &cart.items[0];
        assert!(tee.can_increment());
        assert!(tee.can_decrement());

        let cap = &cart.items[1];
        assert!(!cap.can_increment());
        assert!(!cap.can_decrement());
    }

    #[test]
    fn test_line_total() {
        let cart: CartSnapshot = serde_json::from_str(CART_JSON).unwrap();
        assert_eq!(cart.items[0].line_total(), Decimal::from(40));
    }

    #[test]
    fn test_empty_cart_defaults() {
        let cart: CartSnapshot = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price, Decimal::ZERO);
        assert_eq!(cart, CartSnapshot::empty());
    }
}
