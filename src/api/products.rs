//! Product catalog endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::access::owned;
use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    to_money, validate_amount, validate_category, validate_stock, validate_text, MAX_TEXT_LEN,
};
use crate::db::{
    CreateProductRequest, NewProduct, Product, ProductCategory, UpdateProductRequest,
};
use crate::AppState;

/// Upper bound for free-form product descriptions
const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Validate a CreateProductRequest and turn it into the fields to store
fn validate_create_request(req: CreateProductRequest) -> Result<NewProduct, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("title", validate_text(&req.title, "Title", MAX_TEXT_LEN));
    errors.check(
        "description",
        validate_text(&req.description, "Description", MAX_DESCRIPTION_LEN),
    );
    errors.check("category", validate_category(&req.category));
    match req.price {
        Some(ref price) => errors.check("price", validate_amount(price, "Price")),
        None => errors.add("price", "Price is required"),
    };
    match req.stock {
        Some(stock) => errors.check("stock", validate_stock(stock)),
        None => errors.add("stock", "Stock is required"),
    };
    errors.finish()?;

    match (req.category.parse::<ProductCategory>(), req.price, req.stock) {
        (Ok(category), Some(price), Some(stock)) => Ok(NewProduct {
            title: req.title,
            description: req.description,
            category,
            price: to_money(price),
            stock,
        }),
        _ => Err(ApiError::validation_field("body", "Invalid product")),
    }
}

/// Validate an UpdateProductRequest; absent fields are left alone
fn validate_update_request(req: &UpdateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref title) = req.title {
        errors.check("title", validate_text(title, "Title", MAX_TEXT_LEN));
    }
    if let Some(ref description) = req.description {
        errors.check(
            "description",
            validate_text(description, "Description", MAX_DESCRIPTION_LEN),
        );
    }
    if let Some(ref category) = req.category {
        errors.check("category", validate_category(category));
    }
    if let Some(ref price) = req.price {
        errors.check("price", validate_amount(price, "Price"));
    }
    if let Some(stock) = req.stock {
        errors.check("stock", validate_stock(stock));
    }

    errors.finish()
}

/// POST /api/products/new/
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(req) = payload?;
    let new_product = validate_create_request(req)?;

    let product = Product::create(&state.db, &user.id, &new_product).await?;

    info!(
        product_id = %product.id,
        farmer_id = %user.id,
        price = %product.price,
        "Product created"
    );

    Ok((StatusCode::CREATED, Json(product)))
}

/// The caller's own listings
///
/// GET /api/products/ and GET /api/products/my-products/
pub async fn list_my_products(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = Product::list_for_farmer(&state.db, &user.id).await?;
    Ok(Json(products))
}

/// Every listing, no authentication required
///
/// GET /api/products/marketplace/
pub async fn marketplace(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = Product::list_marketplace(&state.db).await?;
    Ok(Json(products))
}

/// GET /api/products/:id/
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product: Product = owned(&state.db, &user, &id).await?;
    Ok(Json(product))
}

/// PUT|PATCH /api/products/:id/ and /api/products/edit/:id/
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    owned::<Product>(&state.db, &user, &id).await?;

    let Json(mut req) = payload?;
    validate_update_request(&req)?;
    req.price = req.price.map(to_money);

    let product = Product::update_owned(&state.db, &user.id, &id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(Json(product))
}

/// DELETE /api/products/:id/
///
/// Fails with 409 while order items still reference the product.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !Product::delete_owned(&state.db, &user.id, &id).await? {
        return Err(ApiError::not_found("Product not found"));
    }

    info!(product_id = %id, farmer_id = %user.id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}
