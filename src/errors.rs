//! API Error Taxonomy
//! Mission: One wire format for every failure the pipeline can produce

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Application errors with a machine-readable code distinct from the message.
///
/// Handlers and middleware raise the specific kind; `into_response` is the
/// single point that turns any of them into a JSON body. Unanticipated faults
/// arrive through `From<anyhow::Error>` and surface only as a generic 500.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Authentication(String),
    Authorization(String),
    NotFound(String),
    RateLimit {
        message: String,
        retry_after_secs: u64,
        limit: u32,
        remaining: u32,
        reset_at_ms: u64,
    },
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Authentication("Authentication required".to_string())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication(message.into())
    }

    pub fn forbidden() -> Self {
        ApiError::Authorization("Insufficient permissions".to_string())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Authentication(_) => "UNAUTHORIZED",
            ApiError::Authorization(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimit { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        match self {
            ApiError::RateLimit {
                message,
                retry_after_secs,
                limit,
                remaining,
                reset_at_ms,
            } => {
                let body = json!({
                    "error": message,
                    "code": code,
                    "retryAfter": retry_after_secs,
                });
                (
                    status,
                    [
                        ("Retry-After", retry_after_secs.to_string()),
                        ("X-RateLimit-Limit", limit.to_string()),
                        ("X-RateLimit-Remaining", remaining.to_string()),
                        ("X-RateLimit-Reset", reset_at_ms.to_string()),
                    ],
                    Json(body),
                )
                    .into_response()
            }
            ApiError::Internal(err) => {
                // Full detail stays server-side; the caller sees a generic body.
                error!("Unhandled error: {err:#}");
                let body = json!({
                    "error": "An internal error occurred",
                    "code": code,
                });
                (status, Json(body)).into_response()
            }
            ApiError::Validation(message)
            | ApiError::Authentication(message)
            | ApiError::Authorization(message)
            | ApiError::NotFound(message) => {
                let body = json!({ "error": message, "code": code });
                (status, Json(body)).into_response()
            }
        }
    }
}
