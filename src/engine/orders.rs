//! Order placement and buyer/farmer order views.
//!
//! Placing an order is all-or-nothing: line shapes are checked up front,
//! then product prices are read, the header and every item are inserted in
//! a single transaction, and any failure rolls the whole write back. Each
//! item stores the product price read inside that transaction.

use thiserror::Error;
use tracing::{debug, info};

use super::pricing::{quote, LinePrice};
use crate::db::{
    new_id, now_timestamp, DbPool, Numeric, Order, OrderLineRequest, OrderWithItems, OwnerScoped,
};

/// One problem with one order line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub index: usize,
    pub field: &'static str,
    pub message: String,
}

impl LineError {
    fn new(index: usize, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            index,
            field,
            message: message.into(),
        }
    }

    /// Field path as reported to clients, e.g. `items[1].quantity`
    pub fn path(&self) -> String {
        format!("items[{}].{}", self.index, self.field)
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("An order must contain at least one item")]
    EmptyOrder,

    #[error("{} order line(s) are invalid", .0.len())]
    InvalidLines(Vec<LineError>),

    #[error("Order not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A line that passed shape validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

/// Check that every line names a product and a positive quantity.
/// Reports all bad lines at once.
pub fn validate_lines(lines: &[OrderLineRequest]) -> Result<Vec<OrderLine>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut errors = Vec::new();
    let mut valid = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let product_id = line
            .product
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        if product_id.is_none() {
            errors.push(LineError::new(index, "product", "This field is required"));
        }

        match line.quantity {
            None => errors.push(LineError::new(index, "quantity", "This field is required")),
            Some(q) if q <= 0 => errors.push(LineError::new(
                index,
                "quantity",
                "Quantity must be greater than zero",
            )),
            Some(_) => {}
        }

        if let (Some(product_id), Some(quantity)) = (product_id, line.quantity) {
            valid.push(OrderLine {
                product_id: product_id.to_string(),
                quantity,
            });
        }
    }

    if errors.is_empty() {
        Ok(valid)
    } else {
        Err(OrderError::InvalidLines(errors))
    }
}

/// Order operations, always on behalf of an authenticated caller
#[derive(Clone)]
pub struct OrderEngine {
    db: DbPool,
}

impl OrderEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Place an order for `buyer_id`.
    ///
    /// Stock is informational only: it is neither checked nor decremented.
    pub async fn create(
        &self,
        buyer_id: &str,
        lines: &[OrderLineRequest],
    ) -> Result<OrderWithItems, OrderError> {
        let lines = validate_lines(lines)?;

        // Take the write lock before reading prices. A deferred transaction
        // that reads and then writes fails with SQLITE_BUSY instead of waiting
        // when another connection commits in between.
        let mut tx = self.db.begin_with("BEGIN IMMEDIATE").await?;

        // Price snapshot, read inside the transaction that writes the items
        let mut priced = Vec::with_capacity(lines.len());
        let mut errors = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let price: Option<(Numeric,)> =
                sqlx::query_as("SELECT price FROM products WHERE id = ?")
                    .bind(&line.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match price {
                Some((price,)) => priced.push(LinePrice {
                    unit_price: price.value(),
                    quantity: line.quantity,
                }),
                None => errors.push(LineError::new(
                    index,
                    "product",
                    format!("Invalid product \"{}\" - object does not exist", line.product_id),
                )),
            }
        }
        if !errors.is_empty() {
            // Dropping `tx` rolls back; nothing has been written yet anyway
            return Err(OrderError::InvalidLines(errors));
        }

        let quote = quote(&priced).map_err(|overflow| {
            OrderError::InvalidLines(vec![LineError::new(
                overflow.index,
                "quantity",
                "Line total exceeds the supported amount",
            )])
        })?;

        let order_id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, total_price, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(buyer_id)
        .bind(Numeric::new(quote.total))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for (line, price) in lines.iter().zip(&priced) {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_id())
            .bind(&order_id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(Numeric::new(price.unit_price))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            order_id = %order_id,
            buyer_id = %buyer_id,
            items = lines.len(),
            total = %quote.total,
            "Order placed"
        );

        self.get(buyer_id, &order_id).await
    }

    /// The caller's order with its items. Someone else's order is reported
    /// exactly like a missing one.
    pub async fn get(&self, caller_id: &str, order_id: &str) -> Result<OrderWithItems, OrderError> {
        let order = Order::find_owned_by(&self.db, caller_id, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        Ok(order.with_items(&self.db).await?)
    }

    /// Delete the caller's order and its items. Deleting twice fails the second time.
    pub async fn delete(&self, caller_id: &str, order_id: &str) -> Result<(), OrderError> {
        if Order::delete_owned(&self.db, caller_id, order_id).await? {
            info!(order_id = %order_id, buyer_id = %caller_id, "Order deleted");
            Ok(())
        } else {
            Err(OrderError::NotFound)
        }
    }

    /// Orders placed by the caller, newest first
    pub async fn list_by_buyer(&self, caller_id: &str) -> Result<Vec<OrderWithItems>, OrderError> {
        let orders = Order::list_for_buyer(&self.db, caller_id).await?;
        self.load_items(orders).await
    }

    /// Orders that contain at least one of the caller's products.
    ///
    /// Each order is returned whole, including lines for other farmers' products.
    pub async fn list_by_farmer(&self, caller_id: &str) -> Result<Vec<OrderWithItems>, OrderError> {
        let orders = Order::list_for_farmer(&self.db, caller_id).await?;
        debug!(farmer_id = %caller_id, count = orders.len(), "Loaded farmer orders");
        self.load_items(orders).await
    }

    async fn load_items(&self, orders: Vec<Order>) -> Result<Vec<OrderWithItems>, OrderError> {
        let mut results = Vec::with_capacity(orders.len());
        for order in orders {
            results.push(order.with_items(&self.db).await?);
        }
        Ok(results)
    }
}
