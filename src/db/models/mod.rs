//! Database models split into domain-specific modules.

pub mod common;
pub mod order;
pub mod product;
pub mod profile;
pub mod user;

pub use common::*;
pub use order::*;
pub use product::*;
pub use profile::*;
pub use user::*;
