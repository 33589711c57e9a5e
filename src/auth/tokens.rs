//! Token Service
//! Mission: Issue and verify signed session tokens with independent
//! access/refresh signature domains

use crate::auth::models::{AccessClaims, TokenPair, User};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// Access tokens are short-lived so a leaked one has a bounded blast radius.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Refresh tokens are long-lived; revocation comes from the persisted record.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Issues and verifies the access/refresh token pair.
///
/// Access and refresh tokens are signed with independent secrets so that
/// compromise of one does not permit forging the other. Verification here is
/// signature + expiry only: the persisted-record check that makes refresh
/// tokens revocable is the caller's responsibility.
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }

    /// Generate an access + refresh pair for a user.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        let access_token = self.sign(user, &self.access_secret, self.access_ttl)?;
        let refresh_token = self.sign(user, &self.refresh_secret, self.refresh_ttl)?;
        let refresh_expires_at = Utc::now() + self.refresh_ttl;

        debug!(
            user_id = %user.id,
            "Issued token pair (access {}m, refresh {}d)",
            self.access_ttl.num_minutes(),
            self.refresh_ttl.num_days()
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    /// Validate an access token and extract its claims. No store lookup.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        self.verify(token, &self.access_secret)
            .context("Invalid or expired access token")
    }

    /// Validate a refresh token's signature and expiry. The caller must also
    /// confirm the matching persisted record still exists.
    pub fn verify_refresh(&self, token: &str) -> Result<AccessClaims> {
        self.verify(token, &self.refresh_secret)
            .context("Invalid or expired refresh token")
    }

    fn sign(&self, user: &User, secret: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(ttl)
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .context("Failed to sign token")
    }

    fn verify(&self, token: &str, secret: &str) -> Result<AccessClaims> {
        let decoded = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(decoded.claims)
    }
}
