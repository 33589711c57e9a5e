//! HTTP middleware: rate limiting and request logging.

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{rate_limit, RateLimitGate, RateLimitPolicy, RateLimiter};
