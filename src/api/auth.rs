use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_role, validate_username};
use crate::config::AuthConfig;
use crate::db::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest, User,
    UserResponse, UserRole,
};
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims for access and refresh tokens (HS256)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn new(config: &AuthConfig, user: &User, token_type: TokenType) -> Self {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => Duration::minutes(config.access_token_minutes),
            TokenType::Refresh => Duration::days(config.refresh_token_days),
        };
        Self {
            sub: user.id.clone(),
            role: user.role.clone(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

fn encode_claims(config: &AuthConfig, claims: &Claims) -> Result<String, ApiError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
}

/// Sign a token of the given type for `user`
pub fn issue_token(config: &AuthConfig, user: &User, token_type: TokenType) -> Result<String, ApiError> {
    encode_claims(config, &Claims::new(config, user, token_type))
}

/// Verify signature, expiry and token type
pub fn decode_token(config: &AuthConfig, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::unauthorized("Token is invalid or expired")
    })?;

    if data.claims.token_type != expected {
        return Err(ApiError::unauthorized("Token has wrong type"));
    }

    Ok(data.claims)
}

/// Register endpoint
///
/// POST /api/users/register/
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(request) = payload?;
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("username", validate_username(&username));
    errors.check("email", validate_email(&email));
    errors.check("password", validate_password(&request.password));
    errors.check("role", validate_role(&request.role));
    if let Err(e) = errors.finish() {
        warn!(username = %username, "Registration rejected: {}", e);
        return Err(e);
    }

    let role: UserRole = request
        .role
        .parse()
        .map_err(|e: String| ApiError::validation_field("role", e))?;

    let (username_taken, email_taken) = User::find_taken(&state.db, &username, &email).await?;
    if username_taken || email_taken {
        let field = if username_taken { "username" } else { "email" };
        warn!(username = %username, "Registration rejected: {} already registered", field);
        return Err(ApiError::conflict(format!(
            "A user with that {} already exists",
            field
        )));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = User::create(&state.db, &username, &email, &password_hash, role).await?;

    info!(user_id = %user.id, username = %user.username, role = %role, "User registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login endpoint
///
/// POST /api/users/login/
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload?;

    let user = User::get_by_username(&state.db, request.username.trim()).await?;

    let user = match user {
        Some(user) if verify_password(&request.password, &user.password_hash) => user,
        _ => {
            warn!(username = %request.username, "Failed login attempt");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let access = issue_token(&state.config.auth, &user, TokenType::Access)?;
    let refresh = issue_token(&state.config.auth, &user, TokenType::Refresh)?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access,
        refresh,
        user: UserResponse::from(user),
    }))
}

/// Exchange a refresh token for a new access token
///
/// POST /api/users/token/refresh/
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let Json(request) = payload?;

    let claims = decode_token(&state.config.auth, &request.refresh, TokenType::Refresh)?;
    let user = User::get_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access = issue_token(&state.config.auth, &user, TokenType::Access)?;
    Ok(Json(RefreshResponse { access }))
}

/// The caller's account
///
/// GET /api/users/me/ and GET /api/users/protected/
pub async fn me(user: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role.to_string(),
    })
}

/// The authenticated caller, resolved from the bearer access token.
///
/// Handlers take the caller id from here and nowhere else.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            role: user.role_enum(),
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;
        let claims = decode_token(&state.config.auth, token, TokenType::Access)?;

        let user = User::get_by_id(&state.db, &claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User not found"))?;

        Ok(AuthUser::from(user))
    }
}
