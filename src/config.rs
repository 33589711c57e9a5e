//! Application Configuration
//! Mission: Load runtime settings from the environment, failing fast on
//! missing secrets

use anyhow::{bail, Result};
use std::env;

/// Settings resolved once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    /// Signing secret for short-lived access tokens.
    pub jwt_secret: String,
    /// Independent signing secret for long-lived refresh tokens. Compromise
    /// of one secret must not permit forging the other token kind.
    pub jwt_refresh_secret: String,
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// Missing signing secrets are a startup invariant violation, not a
    /// per-request error: the process refuses to boot without them.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        let jwt_refresh_secret = env::var("JWT_REFRESH_SECRET").unwrap_or_default();

        if jwt_secret.trim().is_empty() || jwt_refresh_secret.trim().is_empty() {
            bail!("JWT_SECRET and JWT_REFRESH_SECRET must be set in environment variables");
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let database_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "gatekit.db".to_string());

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_refresh_secret,
        })
    }
}
