use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Product as returned by the store API (batch path).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub description: String,
    pub category: String,
    pub image: String,
}

/// User as returned by the store API (batch path).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    /// firstname, lastname
    pub name: HashMap<String, String>,
    pub phone: String,
    pub address: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CartItem {
    #[serde(rename = "productId")]
    pub product_id: i64,
    pub quantity: u32,
}

/// Cart snapshot as returned by the store API (streaming path).
/// Immutable once fetched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Cart {
    pub id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub date: DateTime<Utc>,
    pub products: Vec<CartItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_cart_from_api_payload() {
        let payload = r#"{
            "id": 1,
            "userId": 4,
            "date": "2020-03-02T00:00:00.000Z",
            "products": [
                {"productId": 1, "quantity": 4},
                {"productId": 2, "quantity": 1}
            ]
        }"#;

        let cart: Cart = serde_json::from_str(payload).unwrap();
        assert_eq!(cart.id, 1);
        assert_eq!(cart.user_id, 4);
        assert_eq!(cart.products.len(), 2);
        assert_eq!(cart.products[0].product_id, 1);
        assert_eq!(cart.products[0].quantity, 4);
    }

    #[test]
    fn deserialize_product_from_api_payload() {
        let payload = r#"{
            "id": 7,
            "title": "White Gold Plated Princess",
            "price": 9.99,
            "description": "Classic Created Wedding Engagement Ring",
            "category": "jewelery",
            "image": "https://example.com/ring.jpg"
        }"#;

        let product: Product = serde_json::from_str(payload).unwrap();
        assert_eq!(product.id, 7);
        assert_eq!(product.category, "jewelery");
    }

    #[test]
    fn deserialize_user_keeps_nested_fields() {
        let payload = r#"{
            "id": 1,
            "email": "john@example.com",
            "username": "johnd",
            "name": {"firstname": "john", "lastname": "doe"},
            "phone": "1-570-236-7033",
            "address": {"city": "kilcoole", "zipcode": "12926-3874"}
        }"#;

        let user: User = serde_json::from_str(payload).unwrap();
        assert_eq!(user.name.get("firstname").unwrap(), "john");
        assert_eq!(user.address["city"], "kilcoole");
    }
}
