//! Authentication Endpoints
//! Mission: Login, registration, token rotation, and logout

use crate::auth::models::{
    AuthContext, AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    Role, User, UserResponse,
};
use crate::auth::store::UserStore;
use crate::auth::tokens::TokenService;
use crate::errors::ApiError;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let valid = state.store.verify_password(&email, &payload.password)?;
    if !valid {
        warn!(email = %email, "Login attempt with invalid credentials");
        return Err(ApiError::authentication("Invalid email or password"));
    }

    let user = state
        .store
        .find_user_by_email(&email)?
        .ok_or_else(|| ApiError::authentication("Invalid email or password"))?;

    let response = issue_session(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "User logged in");

    Ok(Json(response))
}

/// Registration endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let email = normalize_email(&payload.email);
    validate_name(name)?;
    validate_email(&email)?;
    validate_password(&payload.password)?;

    if state.store.find_user_by_email(&email)?.is_some() {
        return Err(ApiError::validation("User with this email already exists"));
    }

    let user = state
        .store
        .create_user(name, &email, &payload.password, Role::User)?;

    let response = issue_session(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "User registered");

    Ok((StatusCode::CREATED, Json(response)))
}

/// Refresh endpoint - POST /api/auth/refresh
///
/// Rotation: verify signature/expiry, atomically consume the persisted
/// record, then mint and persist a replacement pair. A token whose record is
/// gone (prior rotation or logout) is revoked. Revoked and expired are both
/// answered with the same 401 so a stale-token holder learns nothing about
/// the session lineage.
pub async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if payload.refresh_token.is_empty() {
        return Err(ApiError::validation("Refresh token is required"));
    }

    let invalid = || ApiError::authentication("Invalid or expired refresh token");

    state
        .tokens
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| invalid())?;

    // Consuming the record here is what makes exactly one of two concurrent
    // rotations win; the loser sees no record and fails as revoked.
    let record = state
        .store
        .take_refresh_record(&payload.refresh_token)?
        .ok_or_else(invalid)?;

    if record.expires_at < Utc::now() {
        // Record already removed by the take; nothing left to clean up.
        return Err(invalid());
    }

    // Re-read the user so a role change takes effect with the new pair.
    let user = state
        .store
        .find_user_by_id(&record.user_id)?
        .ok_or_else(invalid)?;

    let pair = state.tokens.issue_pair(&user)?;
    state
        .store
        .create_refresh_record(&pair.refresh_token, &user.id, pair.refresh_expires_at)?;

    info!(user_id = %user.id, "Token refreshed");

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Logout endpoint - POST /api/auth/logout (authenticated)
///
/// Revokes the submitted refresh token, but only if the caller owns it.
pub async fn logout(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.refresh_token.is_empty() {
        return Err(ApiError::validation("Refresh token is required"));
    }

    state
        .store
        .delete_refresh_record_for_user(&payload.refresh_token, &ctx.user.id)?;

    info!(user_id = %ctx.user.id, "User logged out");

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Current user endpoint - GET /api/auth/me (authenticated)
pub async fn me(Extension(ctx): Extension<AuthContext>) -> Json<UserResponse> {
    Json(UserResponse::from_user(&ctx.user))
}

fn issue_session(state: &AuthState, user: &User) -> Result<AuthResponse, ApiError> {
    let pair = state.tokens.issue_pair(user)?;
    state
        .store
        .create_refresh_record(&pair.refresh_token, &user.id, pair.refresh_expires_at)?;

    Ok(AuthResponse {
        user: UserResponse::from_user(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid email address"))
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if name.len() > 100 {
        return Err(ApiError::validation("Name must be less than 100 characters"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    if password.len() > 128 {
        return Err(ApiError::validation(
            "Password must be less than 128 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation(
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization_and_validation() {
        assert_eq!(normalize_email("  Foo@Example.COM "), "foo@example.com");

        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user@sub.example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Password1").is_ok());
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password(&"Aa1".repeat(50)).is_err()); // over 128
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Ada").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }
}
