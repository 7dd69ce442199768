//! Order engine: pricing and transactional order placement.

pub mod orders;
pub mod pricing;

pub use orders::{LineError, OrderEngine, OrderError, OrderLine};
