//! Farmer and buyer profile endpoints.
//!
//! A caller has at most one profile of each kind. Detail and update routes
//! carry an id segment for URL compatibility, but the profile is always the
//! caller's own.

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
    to_money, validate_amount, validate_optional_text, validate_phone_number, validate_text,
    MAX_TEXT_LEN,
};
use crate::db::{
    BuyerProfile, CreateBuyerProfileRequest, CreateFarmerProfileRequest, FarmerProfile,
    UpdateBuyerProfileRequest, UpdateFarmerProfileRequest,
};
use crate::AppState;

fn validate_farmer_create(req: &CreateFarmerProfileRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("farm_name", validate_text(&req.farm_name, "Farm name", MAX_TEXT_LEN));
    errors.check("location", validate_text(&req.location, "Location", MAX_TEXT_LEN));
    errors.check("phone_number", validate_phone_number(&req.phone_number));
    if let Some(ref size) = req.farm_size {
        errors.check("farm_size", validate_amount(size, "Farm size"));
    }
    errors.finish()
}

fn validate_farmer_update(req: &UpdateFarmerProfileRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.farm_name {
        errors.check("farm_name", validate_text(name, "Farm name", MAX_TEXT_LEN));
    }
    if let Some(ref location) = req.location {
        errors.check("location", validate_text(location, "Location", MAX_TEXT_LEN));
    }
    if let Some(ref phone) = req.phone_number {
        errors.check("phone_number", validate_phone_number(phone));
    }
    if let Some(ref size) = req.farm_size {
        errors.check("farm_size", validate_amount(size, "Farm size"));
    }
    errors.finish()
}

fn validate_buyer_create(req: &CreateBuyerProfileRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check(
        "business_name",
        validate_optional_text(&req.business_name, "Business name", MAX_TEXT_LEN),
    );
    errors.check("phone_number", validate_phone_number(&req.phone_number));
    errors.finish()
}

fn validate_buyer_update(req: &UpdateBuyerProfileRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check(
        "business_name",
        validate_optional_text(&req.business_name, "Business name", MAX_TEXT_LEN),
    );
    if let Some(ref phone) = req.phone_number {
        errors.check("phone_number", validate_phone_number(phone));
    }
    errors.finish()
}

/// POST /api/profiles/farmers/
pub async fn create_farmer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateFarmerProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FarmerProfile>), ApiError> {
    let Json(mut req) = payload?;
    validate_farmer_create(&req)?;

    if FarmerProfile::find_for_owner(&state.db, &user.id).await?.is_some() {
        return Err(ApiError::conflict("Farmer profile already exists"));
    }

    req.farm_size = req.farm_size.map(to_money);
    let profile = FarmerProfile::create(&state.db, &user.id, &req).await?;

    info!(user_id = %user.id, profile_id = %profile.id, "Farmer profile created");

    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /api/profiles/farmers/:id/
pub async fn get_farmer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FarmerProfile>, ApiError> {
    let profile: FarmerProfile = owned(&state.db, &user, &id).await?;
    Ok(Json(profile))
}

/// PUT|PATCH /api/profiles/farmers/:id/
pub async fn update_farmer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateFarmerProfileRequest>, JsonRejection>,
) -> Result<Json<FarmerProfile>, ApiError> {
    owned::<FarmerProfile>(&state.db, &user, &id).await?;

    let Json(mut req) = payload?;
    validate_farmer_update(&req)?;
    req.farm_size = req.farm_size.map(to_money);

    let profile = FarmerProfile::update_for_owner(&state.db, &user.id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Farmer profile not found"))?;

    Ok(Json(profile))
}

/// POST /api/profiles/buyers/
pub async fn create_buyer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateBuyerProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BuyerProfile>), ApiError> {
    let Json(req) = payload?;
    validate_buyer_create(&req)?;

    if BuyerProfile::find_for_owner(&state.db, &user.id).await?.is_some() {
        return Err(ApiError::conflict("Buyer profile already exists"));
    }

    let profile = BuyerProfile::create(&state.db, &user.id, &req).await?;

    info!(user_id = %user.id, profile_id = %profile.id, "Buyer profile created");

    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /api/profiles/buyers/:id/
pub async fn get_buyer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<BuyerProfile>, ApiError> {
    let profile: BuyerProfile = owned(&state.db, &user, &id).await?;
    Ok(Json(profile))
}

/// PUT|PATCH /api/profiles/buyers/:id/
pub async fn update_buyer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBuyerProfileRequest>, JsonRejection>,
) -> Result<Json<BuyerProfile>, ApiError> {
    owned::<BuyerProfile>(&state.db, &user, &id).await?;

    let Json(req) = payload?;
    validate_buyer_update(&req)?;

    let profile = BuyerProfile::update_for_owner(&state.db, &user.id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Buyer profile not found"))?;

    Ok(Json(profile))
}
