//! Authentication Middleware
//! Mission: Gate protected routes on bearer tokens and roles

use crate::auth::models::{AuthContext, PrincipalId, Role};
use crate::auth::rbac;
use crate::auth::store::UserStore;
use crate::auth::tokens::TokenService;
use crate::errors::ApiError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Shared handles the auth middleware needs to resolve a principal.
#[derive(Clone)]
pub struct AuthGate {
    pub store: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
}

impl AuthGate {
    /// Resolve the caller from the Authorization header.
    ///
    /// Verifies the access token (signature + expiry, no store I/O) and then
    /// re-validates the user against the credential store: the store's role
    /// is authoritative, claims are only a cache of identity at issuance.
    fn authenticate(&self, req: &Request) -> Result<AuthContext, ApiError> {
        let token = bearer_token(req).ok_or_else(ApiError::unauthorized)?;

        let claims = self
            .tokens
            .verify_access(token)
            .map_err(|_| ApiError::unauthorized())?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| ApiError::unauthorized())?;

        let user = self
            .store
            .find_user_by_id(&user_id)?
            .ok_or_else(ApiError::unauthorized)?;

        Ok(AuthContext { user })
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Auth middleware that requires a valid bearer token.
///
/// Reuses a principal already resolved by the edge guard instead of
/// re-verifying; otherwise authenticates here. The principal id is attached
/// to the response so the request logger can record it.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if req.extensions().get::<AuthContext>().is_none() {
        let ctx = gate.authenticate(&req).map_err(|e| {
            warn!(path = %req.uri().path(), "Unauthorized request");
            e
        })?;
        req.extensions_mut().insert(ctx);
    }

    let principal_id = req
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.user.id.to_string());

    let mut response = next.run(req).await;
    if let Some(id) = principal_id {
        response.extensions_mut().insert(PrincipalId(id));
    }
    Ok(response)
}

/// Auth middleware that additionally requires a role.
#[derive(Clone)]
pub struct RoleGate {
    pub gate: AuthGate,
    pub role: Role,
}

pub async fn require_role(
    State(role_gate): State<RoleGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if req.extensions().get::<AuthContext>().is_none() {
        let ctx = role_gate.gate.authenticate(&req)?;
        req.extensions_mut().insert(ctx);
    }

    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(ApiError::unauthorized)?;
    rbac::require_role(ctx.user.role, role_gate.role)?;

    let principal_id = ctx.user.id.to_string();
    let mut response = next.run(req).await;
    response.extensions_mut().insert(PrincipalId(principal_id));
    Ok(response)
}

/// Access policy for a path prefix.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub auth: bool,
    pub roles: &'static [Role],
}

/// Edge-layer guard applied before routing.
///
/// Evaluates an ordered (prefix, policy) table longest-prefix-first and
/// performs the authenticate/authorize stages for matching paths. The
/// resolved principal is forwarded via request extensions so inner stages do
/// not re-verify the token.
#[derive(Clone)]
pub struct EdgeGuard {
    gate: AuthGate,
    policies: Arc<Vec<(String, RoutePolicy)>>,
}

impl EdgeGuard {
    pub fn new(gate: AuthGate, mut policies: Vec<(String, RoutePolicy)>) -> Self {
        // Longest prefix wins, so sort once at construction.
        policies.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            gate,
            policies: Arc::new(policies),
        }
    }

    fn policy_for(&self, path: &str) -> Option<&RoutePolicy> {
        self.policies
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, policy)| policy)
    }
}

pub async fn edge_guard(
    State(guard): State<EdgeGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let policy = match guard.policy_for(req.uri().path()) {
        Some(policy) if policy.auth => policy.clone(),
        _ => return Ok(next.run(req).await),
    };

    let ctx = guard.gate.authenticate(&req)?;
    if !policy.roles.is_empty() && !policy.roles.contains(&ctx.user.role) {
        return Err(ApiError::forbidden());
    }

    let principal_id = ctx.user.id.to_string();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    response.extensions_mut().insert(PrincipalId(principal_id));
    Ok(response)
}
