//! Owner-scoped resolution of path ids for detail, update and delete handlers.

use super::auth::AuthUser;
use super::error::ApiError;
use crate::db::{DbPool, OwnerScoped};

/// Load record `id` among those owned by the caller.
///
/// A record that exists but belongs to someone else is reported exactly like
/// a missing one.
pub async fn owned<T: OwnerScoped>(db: &DbPool, caller: &AuthUser, id: &str) -> Result<T, ApiError> {
    T::find_owned_by(db, &caller.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", T::RESOURCE)))
}
