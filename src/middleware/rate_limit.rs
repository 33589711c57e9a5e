//! Rate limiting middleware.
//!
//! Fixed-window request counting per (policy, caller) pair, kept in process
//! memory. The fixed window is an intentional O(1) approximation: a caller
//! can burst up to twice the limit across a window boundary. Expired entries
//! are pruned by a periodic sweep, independent of request traffic.

use crate::auth::models::AuthContext;
use crate::errors::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Per-endpoint-class limit, declared statically and consumed by the
/// pipeline. Distinct policies never share counters.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const LOGIN: Self = Self {
        name: "login",
        max_requests: 10,
        window: Duration::from_secs(15 * 60),
    };
    pub const REGISTER: Self = Self {
        name: "register",
        max_requests: 5,
        window: Duration::from_secs(60 * 60),
    };
    pub const REFRESH: Self = Self {
        name: "refresh",
        max_requests: 20,
        window: Duration::from_secs(60),
    };
    pub const API: Self = Self {
        name: "api",
        max_requests: 100,
        window: Duration::from_secs(60),
    };
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

struct Entry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counters behind a single mutex, so concurrent requests to
/// the same key serialize their read-modify-write. A naive read-then-write
/// here would admit more than the limit under concurrent load.
#[derive(Clone, Default)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<(&'static str, String), Entry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and charge one request against the caller's window.
    pub fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        self.check_at(key, policy, Instant::now())
    }

    fn check_at(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> Decision {
        let mut state = self.state.lock();
        let map_key = (policy.name, key.to_string());

        match state.get_mut(&map_key) {
            // Live window.
            Some(entry) if entry.reset_at > now => {
                if entry.count >= policy.max_requests {
                    // At the limit: report rejection without further charge,
                    // reset_at stays what the window already promised.
                    Decision {
                        allowed: false,
                        remaining: 0,
                        reset_at: entry.reset_at,
                    }
                } else {
                    entry.count += 1;
                    Decision {
                        allowed: true,
                        remaining: policy.max_requests - entry.count,
                        reset_at: entry.reset_at,
                    }
                }
            }
            // First request for this key, or the window has elapsed.
            _ => {
                let reset_at = now + policy.window;
                state.insert(map_key, Entry { count: 1, reset_at });
                Decision {
                    allowed: true,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_at,
                }
            }
        }
    }

    /// Drop entries whose window has elapsed (call from a background task).
    pub fn sweep(&self) {
        let now = Instant::now();
        self.state.lock().retain(|_, entry| entry.reset_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().len()
    }
}

/// Limiter handle plus the policy for one endpoint class.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: RateLimiter,
    pub policy: RateLimitPolicy,
}

/// Rate limiting middleware function. Runs before authentication; the charge
/// is not rolled back if the caller later fails auth or disconnects.
pub async fn rate_limit(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let key = caller_key(&request);
    let decision = gate.limiter.check(&key, &gate.policy);

    if !decision.allowed {
        let retry_after = retry_after_secs(&decision);
        warn!(
            key = %key,
            policy = gate.policy.name,
            retry_after_secs = retry_after,
            "Rate limit exceeded"
        );

        return ApiError::RateLimit {
            message: "Too many requests".to_string(),
            retry_after_secs: retry_after,
            limit: gate.policy.max_requests,
            remaining: decision.remaining,
            reset_at_ms: reset_epoch_ms(&decision),
        }
        .into_response();
    }

    next.run(request).await
}

/// Caller identity for the counter key: the authenticated principal when the
/// edge guard has already resolved one, else the client IP.
fn caller_key(request: &Request) -> String {
    if let Some(ctx) = request.extensions().get::<AuthContext>() {
        return ctx.user.id.to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn retry_after_secs(decision: &Decision) -> u64 {
    let until_reset = decision
        .reset_at
        .saturating_duration_since(Instant::now());
    until_reset.as_secs() + u64::from(until_reset.subsec_nanos() > 0)
}

fn reset_epoch_ms(decision: &Decision) -> u64 {
    let until_reset = decision
        .reset_at
        .saturating_duration_since(Instant::now());
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    now_ms + until_reset.as_millis() as u64
}
