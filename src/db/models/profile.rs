//! Farmer and buyer profile models.
//!
//! Each account has at most one profile of each kind, enforced by a UNIQUE
//! constraint on `user_id`. Profiles are only ever resolved through their
//! owner; the id segment of a detail URL is not consulted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{new_id, now_timestamp, Numeric};
use crate::db::scope::OwnerScoped;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FarmerProfile {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub farm_name: String,
    pub location: String,
    pub phone_number: String,
    pub farm_size: Option<Numeric>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFarmerProfileRequest {
    #[serde(default)]
    pub farm_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub phone_number: String,
    pub farm_size: Option<Numeric>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFarmerProfileRequest {
    pub farm_name: Option<String>,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub farm_size: Option<Numeric>,
}

impl FarmerProfile {
    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        req: &CreateFarmerProfileRequest,
    ) -> Result<FarmerProfile, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO farmer_profiles
                (id, user_id, farm_name, location, phone_number, farm_size, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&req.farm_name)
        .bind(&req.location)
        .bind(&req.phone_number)
        .bind(req.farm_size)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::find_for_owner(db, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_for_owner(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<FarmerProfile>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM farmer_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    /// Apply a partial update to the owner's profile
    pub async fn update_for_owner(
        db: &SqlitePool,
        user_id: &str,
        req: &UpdateFarmerProfileRequest,
    ) -> Result<Option<FarmerProfile>, sqlx::Error> {
        let Some(existing) = Self::find_for_owner(db, user_id).await? else {
            return Ok(None);
        };

        let farm_name = req.farm_name.as_ref().unwrap_or(&existing.farm_name);
        let location = req.location.as_ref().unwrap_or(&existing.location);
        let phone_number = req.phone_number.as_ref().unwrap_or(&existing.phone_number);
        let farm_size = req.farm_size.or(existing.farm_size);
        let now = now_timestamp();

        sqlx::query(
            r#"
            UPDATE farmer_profiles
            SET farm_name = ?, location = ?, phone_number = ?, farm_size = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(farm_name)
        .bind(location)
        .bind(phone_number)
        .bind(farm_size)
        .bind(&now)
        .bind(user_id)
        .execute(db)
        .await?;

        Self::find_for_owner(db, user_id).await
    }
}

#[async_trait]
impl OwnerScoped for FarmerProfile {
    const RESOURCE: &'static str = "Farmer profile";

    async fn find_owned_by(
        db: &SqlitePool,
        owner_id: &str,
        _id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        Self::find_for_owner(db, owner_id).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuyerProfile {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub business_name: Option<String>,
    pub phone_number: String,
    pub preferred_products: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBuyerProfileRequest {
    pub business_name: Option<String>,
    #[serde(default)]
    pub phone_number: String,
    pub preferred_products: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBuyerProfileRequest {
    pub business_name: Option<String>,
    pub phone_number: Option<String>,
    pub preferred_products: Option<String>,
}

impl BuyerProfile {
    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        req: &CreateBuyerProfileRequest,
    ) -> Result<BuyerProfile, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO buyer_profiles
                (id, user_id, business_name, phone_number, preferred_products, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&req.business_name)
        .bind(&req.phone_number)
        .bind(&req.preferred_products)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::find_for_owner(db, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_for_owner(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<BuyerProfile>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM buyer_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn update_for_owner(
        db: &SqlitePool,
        user_id: &str,
        req: &UpdateBuyerProfileRequest,
    ) -> Result<Option<BuyerProfile>, sqlx::Error> {
        let Some(existing) = Self::find_for_owner(db, user_id).await? else {
            return Ok(None);
        };

        let business_name = req.business_name.clone().or(existing.business_name);
        let phone_number = req.phone_number.as_ref().unwrap_or(&existing.phone_number);
        let preferred_products = req
            .preferred_products
            .clone()
            .or(existing.preferred_products);
        let now = now_timestamp();

        sqlx::query(
            r#"
            UPDATE buyer_profiles
            SET business_name = ?, phone_number = ?, preferred_products = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&business_name)
        .bind(phone_number)
        .bind(&preferred_products)
        .bind(&now)
        .bind(user_id)
        .execute(db)
        .await?;

        Self::find_for_owner(db, user_id).await
    }
}

#[async_trait]
impl OwnerScoped for BuyerProfile {
    const RESOURCE: &'static str = "Buyer profile";

    async fn find_owned_by(
        db: &SqlitePool,
        owner_id: &str,
        _id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        Self::find_for_owner(db, owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, User, UserRole};

    fn farm(name: &str) -> CreateFarmerProfileRequest {
        CreateFarmerProfileRequest {
            farm_name: name.to_string(),
            location: "Nairobi".to_string(),
            phone_number: "123456789".to_string(),
            farm_size: Some("50.50".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_second_farmer_profile_is_rejected() {
        let db = test_pool().await;
        let user = User::create(&db, "farmer1", "f1@example.com", "h", UserRole::Farmer)
            .await
            .unwrap();

        FarmerProfile::create(&db, &user.id, &farm("Green Acres"))
            .await
            .unwrap();
        let err = FarmerProfile::create(&db, &user.id, &farm("Other"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));

        // The first profile is untouched
        let profile = FarmerProfile::find_for_owner(&db, &user.id).await.unwrap().unwrap();
        assert_eq!(profile.farm_name, "Green Acres");
    }

    #[tokio::test]
    async fn test_scoped_lookup_ignores_supplied_id() {
        let db = test_pool().await;
        let a = User::create(&db, "a", "a@example.com", "h", UserRole::Farmer).await.unwrap();
        let b = User::create(&db, "b", "b@example.com", "h", UserRole::Farmer).await.unwrap();
        let a_profile = FarmerProfile::create(&db, &a.id, &farm("A")).await.unwrap();
        FarmerProfile::create(&db, &b.id, &farm("B")).await.unwrap();

        // B asking for A's profile id still gets B's own profile
        let found = FarmerProfile::find_owned_by(&db, &b.id, &a_profile.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.farm_name, "B");
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let db = test_pool().await;
        let user = User::create(&db, "buyer1", "b1@example.com", "h", UserRole::Buyer)
            .await
            .unwrap();
        BuyerProfile::create(
            &db,
            &user.id,
            &CreateBuyerProfileRequest {
                business_name: Some("Fresh Produce Ltd".to_string()),
                phone_number: "987654321".to_string(),
                preferred_products: Some("Eggs".to_string()),
            },
        )
        .await
        .unwrap();

        let updated = BuyerProfile::update_for_owner(
            &db,
            &user.id,
            &UpdateBuyerProfileRequest {
                phone_number: Some("111222333".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(updated.phone_number, "111222333");
        assert_eq!(updated.business_name.as_deref(), Some("Fresh Produce Ltd"));
        assert_eq!(updated.preferred_products.as_deref(), Some("Eggs"));
    }

    #[tokio::test]
    async fn test_update_without_profile_returns_none() {
        let db = test_pool().await;
        let user = User::create(&db, "x", "x@example.com", "h", UserRole::Buyer).await.unwrap();
        let result = BuyerProfile::update_for_owner(&db, &user.id, &Default::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
