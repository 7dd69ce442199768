//! Product listings owned by farmers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{new_id, now_timestamp, Numeric};
use crate::db::scope::OwnerScoped;

/// How a listing is sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    /// Priced per kilogram
    Weight,
    /// Priced per bird / item
    Number,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Weight => "weight",
            ProductCategory::Number => "number",
        }
    }
}

impl std::str::FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weight" => Ok(ProductCategory::Weight),
            "number" => Ok(ProductCategory::Number),
            _ => Err(format!("Unknown product category: {}", s)),
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: String,
    #[serde(skip_serializing)]
    pub farmer_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Numeric,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
    /// Owner's username, joined from `users`
    pub farmer_name: String,
}

const SELECT_PRODUCT: &str = r#"
    SELECT p.id, p.farmer_id, p.title, p.description, p.category, p.price, p.stock,
           p.created_at, p.updated_at, u.username AS farmer_name
    FROM products p
    JOIN users u ON u.id = p.farmer_id
"#;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: Option<Numeric>,
    pub stock: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Numeric>,
    pub stock: Option<i64>,
}

/// Validated fields for a new listing
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub category: ProductCategory,
    pub price: Numeric,
    pub stock: i64,
}

impl Product {
    pub fn category_enum(&self) -> Option<ProductCategory> {
        self.category.parse().ok()
    }

    pub async fn create(
        db: &SqlitePool,
        farmer_id: &str,
        product: &NewProduct,
    ) -> Result<Product, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO products
                (id, farmer_id, title, description, category, price, stock, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(farmer_id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.category.as_str())
        .bind(product.price)
        .bind(product.stock)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::find_owned_by(db, farmer_id, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// The caller's own listings, newest first
    pub async fn list_for_farmer(
        db: &SqlitePool,
        farmer_id: &str,
    ) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{} WHERE p.farmer_id = ? ORDER BY p.created_at DESC, p.rowid DESC",
            SELECT_PRODUCT
        ))
        .bind(farmer_id)
        .fetch_all(db)
        .await
    }

    /// Every listing regardless of owner; the public marketplace view
    pub async fn list_marketplace(db: &SqlitePool) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{} ORDER BY p.created_at DESC, p.rowid DESC",
            SELECT_PRODUCT
        ))
        .fetch_all(db)
        .await
    }

    /// Partially update a listing owned by `farmer_id`.
    ///
    /// `category` must already be validated. Returns `None` when the caller
    /// owns no such product.
    pub async fn update_owned(
        db: &SqlitePool,
        farmer_id: &str,
        id: &str,
        req: &UpdateProductRequest,
    ) -> Result<Option<Product>, sqlx::Error> {
        let Some(existing) = Self::find_owned_by(db, farmer_id, id).await? else {
            return Ok(None);
        };

        let title = req.title.as_ref().unwrap_or(&existing.title);
        let description = req.description.as_ref().unwrap_or(&existing.description);
        let category = req.category.as_ref().unwrap_or(&existing.category).to_lowercase();
        let price = req.price.unwrap_or(existing.price);
        let stock = req.stock.unwrap_or(existing.stock);
        let now = now_timestamp();

        sqlx::query(
            r#"
            UPDATE products
            SET title = ?, description = ?, category = ?, price = ?, stock = ?, updated_at = ?
            WHERE id = ? AND farmer_id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(&category)
        .bind(price)
        .bind(stock)
        .bind(&now)
        .bind(id)
        .bind(farmer_id)
        .execute(db)
        .await?;

        Self::find_owned_by(db, farmer_id, id).await
    }

    /// Delete a listing owned by `farmer_id`; false when there was none
    pub async fn delete_owned(
        db: &SqlitePool,
        farmer_id: &str,
        id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = ? AND farmer_id = ?")
            .bind(id)
            .bind(farmer_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OwnerScoped for Product {
    const RESOURCE: &'static str = "Product";

    async fn find_owned_by(
        db: &SqlitePool,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{} WHERE p.farmer_id = ? AND p.id = ?",
            SELECT_PRODUCT
        ))
        .bind(owner_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }
}
