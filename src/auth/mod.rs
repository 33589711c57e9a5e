//! Authentication Module
//! Mission: Token issuance and rotation, credential storage, RBAC, and the
//! middleware gates built on them

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rbac;
pub mod store;
pub mod tokens;

pub use handlers::AuthState;
pub use middleware::{AuthGate, EdgeGuard, RoleGate, RoutePolicy};
pub use models::{AccessClaims, AuthContext, PrincipalId, Role, User};
pub use store::UserStore;
pub use tokens::TokenService;
