//! Owner-scoped lookups.
//!
//! Every caller-owned resource type (profiles, products, orders) is read for
//! detail, update and delete through [`OwnerScoped::find_owned_by`]. The
//! query filters on the owning user first; the record id supplied by the
//! client only narrows the already-scoped set and is never used to decide
//! ownership. Resource types implementing this trait expose no unscoped
//! "get by id" for request handlers.

use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait OwnerScoped: Sized + Send {
    /// Human-readable name used in not-found messages
    const RESOURCE: &'static str;

    /// Find the record `id` among the records owned by `owner_id`.
    ///
    /// Returns `None` both when the record does not exist and when it
    /// belongs to someone else; callers must not distinguish the two.
    async fn find_owned_by(
        db: &SqlitePool,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<Self>, sqlx::Error>;
}
