pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::engine::OrderEngine;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub orders: OrderEngine,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let orders = OrderEngine::new(db.clone());
        Self {
            config,
            db,
            orders,
            rate_limiter,
        }
    }
}
