//! Router Assembly
//! Mission: Compose the request pipeline every endpoint passes through

use crate::api;
use crate::auth::{
    handlers as auth_handlers,
    middleware::{edge_guard, require_auth, require_role},
    AuthGate, AuthState, EdgeGuard, Role, RoleGate, RoutePolicy, TokenService, UserStore,
};
use crate::middleware::{rate_limit, request_logging, RateLimitGate, RateLimitPolicy, RateLimiter};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Edge-layer protection table: ordered (path prefix, policy) pairs,
/// evaluated longest-prefix-first. Kept as data so policies are testable in
/// isolation from the routes they guard.
pub fn default_route_policies() -> Vec<(String, RoutePolicy)> {
    vec![
        (
            "/api/users".to_string(),
            RoutePolicy {
                auth: true,
                roles: &[Role::Admin],
            },
        ),
        (
            "/api/auth/logout".to_string(),
            RoutePolicy {
                auth: true,
                roles: &[],
            },
        ),
        (
            "/api/auth/me".to_string(),
            RoutePolicy {
                auth: true,
                roles: &[],
            },
        ),
    ]
}

/// Build the application router.
///
/// Stage order per request: logging (outermost) -> edge guard -> per-route
/// rate limit -> route auth/role check -> handler. Rate limiting for the
/// public auth endpoints therefore keys by IP; for protected routes the edge
/// guard has already resolved a principal and the limiter keys by user id.
pub fn build_router(
    store: Arc<UserStore>,
    tokens: Arc<TokenService>,
    limiter: RateLimiter,
) -> Router {
    let auth_state = AuthState {
        store: store.clone(),
        tokens: tokens.clone(),
    };
    let gate = AuthGate { store, tokens };

    let gated = |policy: RateLimitPolicy| RateLimitGate {
        limiter: limiter.clone(),
        policy,
    };

    let login_routes = Router::new()
        .route("/api/auth/login", post(auth_handlers::login))
        .route_layer(from_fn_with_state(gated(RateLimitPolicy::LOGIN), rate_limit))
        .with_state(auth_state.clone());

    let register_routes = Router::new()
        .route("/api/auth/register", post(auth_handlers::register))
        .route_layer(from_fn_with_state(
            gated(RateLimitPolicy::REGISTER),
            rate_limit,
        ))
        .with_state(auth_state.clone());

    let refresh_routes = Router::new()
        .route("/api/auth/refresh", post(auth_handlers::refresh))
        .route_layer(from_fn_with_state(
            gated(RateLimitPolicy::REFRESH),
            rate_limit,
        ))
        .with_state(auth_state.clone());

    // Authenticated session routes. Layers run last-added first, so the rate
    // limit stage precedes the auth stage.
    let session_routes = Router::new()
        .route("/api/auth/logout", post(auth_handlers::logout))
        .route("/api/auth/me", get(auth_handlers::me))
        .route_layer(from_fn_with_state(gate.clone(), require_auth))
        .route_layer(from_fn_with_state(gated(RateLimitPolicy::API), rate_limit))
        .with_state(auth_state.clone());

    let admin_routes = Router::new()
        .route("/api/users", get(api::list_users))
        .route(
            "/api/users/:id",
            patch(api::update_user_role).delete(api::delete_user),
        )
        .route_layer(from_fn_with_state(
            RoleGate {
                gate: gate.clone(),
                role: Role::Admin,
            },
            require_role,
        ))
        .route_layer(from_fn_with_state(gated(RateLimitPolicy::API), rate_limit))
        .with_state(auth_state);

    let public_routes = Router::new().route("/health", get(health_check));

    let edge = EdgeGuard::new(gate, default_route_policies());

    Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(register_routes)
        .merge(refresh_routes)
        .merge(session_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(edge, edge_guard))
        .layer(from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
