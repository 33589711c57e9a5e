//! Role-Based Access Control
//! Mission: Answer "does this principal hold role X" and nothing else

use crate::auth::models::Role;
use crate::errors::ApiError;

/// Check if the principal holds the required role. Reads only the role;
/// self-or-admin style policies are each handler's decision, not this one's.
pub fn has_role(principal_role: Role, required: Role) -> bool {
    principal_role == required
}

/// Require a specific role, failing with 403 otherwise.
pub fn require_role(principal_role: Role, required: Role) -> Result<(), ApiError> {
    if has_role(principal_role, required) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

pub fn is_admin(principal_role: Role) -> bool {
    has_role(principal_role, Role::Admin)
}

pub fn require_admin(principal_role: Role) -> Result<(), ApiError> {
    require_role(principal_role, Role::Admin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_require_role() {
        assert!(require_role(Role::Admin, Role::Admin).is_ok());
        assert!(require_role(Role::User, Role::User).is_ok());

        let err = require_role(Role::User, Role::Admin).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_is_admin() {
        assert!(is_admin(Role::Admin));
        assert!(!is_admin(Role::User));
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(Role::Admin).is_ok());
        assert!(require_admin(Role::User).is_err());
    }
}
