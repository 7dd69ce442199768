//! Order endpoints. The buyer is always the authenticated caller.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::db::{CreateOrderRequest, OrderResponse, OrderWithItems};
use crate::AppState;

fn to_responses(orders: Vec<OrderWithItems>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

/// POST /api/products/orders/
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = payload?;

    if let Some(ref claimed) = req.buyer {
        tracing::debug!(buyer_id = %user.id, claimed = %claimed, "Ignoring buyer field in order body");
    }

    let order = state.orders.create(&user.id, &req.items).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// GET /api/products/orders/ and GET /api/products/orders/buyer/
pub async fn list_buyer_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_by_buyer(&user.id).await?;
    Ok(Json(to_responses(orders)))
}

/// Orders containing at least one of the caller's products
///
/// GET /api/products/orders/farmer/
pub async fn list_farmer_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_by_farmer(&user.id).await?;
    Ok(Json(to_responses(orders)))
}

/// GET /api/products/orders/:id/
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get(&user.id, &id).await?;
    Ok(Json(OrderResponse::from(order)))
}

/// DELETE /api/products/orders/:id/
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orders.delete(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
