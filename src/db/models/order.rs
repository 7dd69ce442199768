//! Order and order item models.
//!
//! Orders are written only by the order engine (`crate::engine::orders`),
//! which creates the header and its items in one transaction. This module
//! holds the row types, the response shape and the read/delete queries.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::Numeric;
use crate::db::scope::OwnerScoped;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    pub total_price: Numeric,
    pub created_at: String,
    pub updated_at: String,
}

/// A line of an order with the unit price captured when the order was placed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_title: String,
    pub quantity: i64,
    /// Unit price snapshot; never follows later product price changes
    pub price: Numeric,
}

#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    /// Sum of `price * quantity` over the stored items
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price.value() * Decimal::from(item.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product: String,
    pub product_title: String,
    pub quantity: i64,
    pub price: Numeric,
}

/// Wire shape of an order. `total_price` is a JSON number, item prices
/// remain decimal strings.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(value: OrderWithItems) -> Self {
        let OrderWithItems { order, items } = value;
        Self {
            id: order.id,
            buyer: order.buyer_id,
            total_price: order.total_price.value(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product: item.product_id,
                    product_title: item.product_title,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Accepted for compatibility with older clients; the buyer is always the caller
    #[serde(default)]
    pub buyer: Option<serde_json::Value>,
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub product: Option<String>,
    pub quantity: Option<i64>,
}

impl Order {
    /// Items of one order in insertion order
    pub async fn items(db: &SqlitePool, order_id: &str) -> Result<Vec<OrderItem>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT oi.id, oi.order_id, oi.product_id, p.title AS product_title, oi.quantity, oi.price
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ?
            ORDER BY oi.rowid ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(db)
        .await
    }

    pub async fn with_items(self, db: &SqlitePool) -> Result<OrderWithItems, sqlx::Error> {
        let items = Self::items(db, &self.id).await?;
        Ok(OrderWithItems { order: self, items })
    }

    /// Orders placed by `buyer_id`, newest first
    pub async fn list_for_buyer(
        db: &SqlitePool,
        buyer_id: &str,
    ) -> Result<Vec<Order>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM orders
            WHERE buyer_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(buyer_id)
        .fetch_all(db)
        .await
    }

    /// Orders containing at least one item of a product owned by `farmer_id`,
    /// each listed once, newest first
    pub async fn list_for_farmer(
        db: &SqlitePool,
        farmer_id: &str,
    ) -> Result<Vec<Order>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT o.id, o.buyer_id, o.total_price, o.created_at, o.updated_at
            FROM orders o
            WHERE EXISTS (
                SELECT 1
                FROM order_items oi
                JOIN products p ON p.id = oi.product_id
                WHERE oi.order_id = o.id AND p.farmer_id = ?
            )
            ORDER BY o.created_at DESC, o.rowid DESC
            "#,
        )
        .bind(farmer_id)
        .fetch_all(db)
        .await
    }

    /// Delete an order placed by `buyer_id`; items go with it via ON DELETE CASCADE.
    /// Returns false when the caller has no such order.
    pub async fn delete_owned(
        db: &SqlitePool,
        buyer_id: &str,
        id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ? AND buyer_id = ?")
            .bind(id)
            .bind(buyer_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OwnerScoped for Order {
    const RESOURCE: &'static str = "Order";

    async fn find_owned_by(
        db: &SqlitePool,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM orders WHERE buyer_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id)
            .fetch_optional(db)
            .await
    }
}
