//! Admin User Endpoints
//! Mission: Representative protected CRUD exercising the full pipeline

use crate::auth::models::{AuthContext, Role, UserResponse};
use crate::auth::rbac;
use crate::auth::AuthState;
use crate::errors::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
    pub pagination: Pagination,
}

/// List users - GET /api/users (admin only)
pub async fn list_users(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    rbac::require_admin(ctx.user.role)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (users, total) = state.store.list_users(page, limit)?;

    info!(
        count = users.len(),
        total,
        page,
        admin_id = %ctx.user.id,
        "Users fetched"
    );

    Ok(Json(ListUsersResponse {
        users: users.iter().map(UserResponse::from_user).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit as u64),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Update a user's role - PATCH /api/users/:id (admin only)
///
/// The new role is authoritative in the store immediately, but the target's
/// outstanding access tokens keep their old role until their next refresh.
pub async fn update_user_role(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    rbac::require_admin(ctx.user.role)?;

    let uuid = parse_user_id(&user_id)?;
    if !state.store.update_user_role(&uuid, payload.role)? {
        return Err(ApiError::not_found("User not found"));
    }

    let user = state
        .store
        .find_user_by_id(&uuid)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(
        user_id = %uuid,
        role = payload.role.as_str(),
        admin_id = %ctx.user.id,
        "User role updated"
    );

    Ok(Json(UserResponse::from_user(&user)))
}

/// Delete a user - DELETE /api/users/:id (admin only)
pub async fn delete_user(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    rbac::require_admin(ctx.user.role)?;

    let uuid = parse_user_id(&user_id)?;
    if uuid == ctx.user.id {
        return Err(ApiError::validation("Cannot delete your own account"));
    }

    if !state.store.delete_user(&uuid)? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %uuid, admin_id = %ctx.user.id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid user ID format"))
}
