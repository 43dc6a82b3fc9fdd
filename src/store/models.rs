//! Typed rows of the relational backend

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `items` is kept as the JSON text it was stored with
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Order {
    pub id: i32,
    pub user_id: Option<i32>,
    pub items: String,
    pub total_amount: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str = "id, name, email, created_at, updated_at";
pub(crate) const PRODUCT_COLUMNS: &str = "id, name, price, description, created_at, updated_at";
pub(crate) const ORDER_COLUMNS: &str =
    "id, user_id, items, total_amount, status, created_at, updated_at";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_serializes_optional_fields_as_null() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let order = Order {
            id: 1,
            user_id: None,
            items: "[\"widget\"]".into(),
            total_amount: None,
            status: "pending".into(),
            created_at: ts,
            updated_at: ts,
        };
        let value = serde_json::to_value(&order).unwrap();
        assert!(value["user_id"].is_null());
        assert!(value["total_amount"].is_null());
        assert_eq!(value["items"], "[\"widget\"]");
        assert_eq!(value["created_at"], "2024-01-01T00:00:00Z");
    }
}
