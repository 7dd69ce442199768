mod access;
pub mod auth;
pub mod error;
mod orders;
mod products;
mod profiles;
pub mod rate_limit;
mod validation;

#[cfg(test)]
mod tests;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Account routes (public, rate limited per client IP)
    let account_routes = Router::new()
        .route("/api/users/register/", post(auth::register))
        .route("/api/users/login/", post(auth::login))
        .route("/api/users/token/refresh/", post(auth::refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Authenticated routes; the AuthUser extractor rejects missing or bad tokens
    let api_routes = Router::new()
        .route("/api/users/me/", get(auth::me))
        .route("/api/users/protected/", get(auth::me))
        // Profiles
        .route("/api/profiles/farmers/", post(profiles::create_farmer_profile))
        .route(
            "/api/profiles/farmers/:id/",
            get(profiles::get_farmer_profile)
                .put(profiles::update_farmer_profile)
                .patch(profiles::update_farmer_profile),
        )
        .route("/api/profiles/buyers/", post(profiles::create_buyer_profile))
        .route(
            "/api/profiles/buyers/:id/",
            get(profiles::get_buyer_profile)
                .put(profiles::update_buyer_profile)
                .patch(profiles::update_buyer_profile),
        )
        // Products
        .route("/api/products/", get(products::list_my_products))
        .route("/api/products/my-products/", get(products::list_my_products))
        .route("/api/products/new/", post(products::create_product))
        .route(
            "/api/products/:id/",
            get(products::get_product)
                .put(products::update_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/products/edit/:id/",
            axum::routing::put(products::update_product).patch(products::update_product),
        )
        // Orders
        .route(
            "/api/products/orders/",
            get(orders::list_buyer_orders).post(orders::create_order),
        )
        .route("/api/products/orders/buyer/", get(orders::list_buyer_orders))
        .route("/api/products/orders/farmer/", get(orders::list_farmer_orders))
        .route(
            "/api/products/orders/:id/",
            get(orders::get_order).delete(orders::delete_order),
        );

    // Public marketplace
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/products/marketplace/", get(products::marketplace));

    let mut router = Router::new()
        .merge(account_routes)
        .merge(api_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.server.cors_allowed_origins) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// CORS for the configured browser origins; `None` when none are configured
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    )
}

async fn health_check() -> &'static str {
    "OK"
}
