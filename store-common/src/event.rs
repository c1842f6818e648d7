use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Cart;

/// Event type constant for cart observations.
pub const CART_CREATED: &str = "cart_created";

/// A cart observation as published on the bus and written to the warehouse.
///
/// Consumed exactly once logically, but may be delivered more than once
/// physically (at-least-once bus semantics); the warehouse tolerates
/// duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub extracted_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
    pub cart_id: i64,
    pub user_id: i64,
    pub cart_date: DateTime<Utc>,
    pub total_items: u64,
}

impl CartEvent {
    /// Build the event for a cart observed at `extracted_at`. A fresh event
    /// id and publish timestamp are generated per call; everything else is
    /// derived from the cart.
    pub fn from_cart(cart: &Cart, extracted_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: CART_CREATED.to_string(),
            extracted_at,
            published_at: Utc::now(),
            cart_id: cart.id,
            user_id: cart.user_id,
            cart_date: cart.date,
            total_items: cart.products.iter().map(|p| u64::from(p.quantity)).sum(),
        }
    }

    /// Bus partition key: all events for a cart land on the same partition.
    pub fn key(&self) -> String {
        self.cart_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::models::CartItem;

    use super::*;

    fn cart(items: Vec<(i64, u32)>) -> Cart {
        Cart {
            id: 42,
            user_id: 7,
            date: Utc::now(),
            products: items
                .into_iter()
                .map(|(product_id, quantity)| CartItem {
                    product_id,
                    quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn total_items_sums_line_item_quantities() {
        let event = CartEvent::from_cart(&cart(vec![(1, 2), (5, 3)]), Utc::now());
        assert_eq!(event.total_items, 5);
    }

    #[test]
    fn empty_cart_has_zero_items() {
        let event = CartEvent::from_cart(&cart(vec![]), Utc::now());
        assert_eq!(event.total_items, 0);
    }

    #[test]
    fn wire_format_field_names() {
        let event = CartEvent::from_cart(&cart(vec![(1, 1)]), Utc::now());
        let value = serde_json::to_value(&event).unwrap();

        for field in [
            "event_id",
            "event_type",
            "extracted_at",
            "published_at",
            "cart_id",
            "user_id",
            "cart_date",
            "total_items",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["event_type"], CART_CREATED);
        assert_eq!(value["cart_id"], 42);
        assert_eq!(value["user_id"], 7);
    }

    #[test]
    fn round_trips_through_json() {
        let event = CartEvent::from_cart(&cart(vec![(3, 9)]), Utc::now());
        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: CartEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn key_is_the_cart_id() {
        let event = CartEvent::from_cart(&cart(vec![]), Utc::now());
        assert_eq!(event.key(), "42");
    }
}
