//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias used throughout the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of error codes exposed on the wire (spec §7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AuthenticationError,
    AuthorizationError,
    ResourceNotFound,
    ResourceConflict,
    RateLimitExceeded,
    IntegrationError,
    SystemError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::AuthenticationError => StatusCode::UNAUTHORIZED,
            ErrorCode::AuthorizationError => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ResourceConflict => StatusCode::CONFLICT,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::IntegrationError => StatusCode::BAD_GATEWAY,
            ErrorCode::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Gateway-wide error type. Each variant maps to exactly one `ErrorCode`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("Database error: {0}")]
    Database(Box<sqlx::Error>),

    #[error("KV substrate error: {0}")]
    Kv(Box<redis::RedisError>),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Idempotency-key reuse with a diverging request
    #[error("Conflict: {message}")]
    Conflict { message: String, details: Option<Value> },

    /// Rate limit, RPM/RPH/IP, or daily quota exceeded. `retry_after` in seconds.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64, details: Option<Value> },

    /// Upstream failure or breaker open
    #[error("Upstream integration error: {0}")]
    Integration(String),

    /// Upstream rejected the request with a 4xx other than 401/429: passed
    /// through verbatim rather than folded into a fixed code (spec §4.5).
    #[error("Upstream rejected request: {message}")]
    UpstreamRejected { status: StatusCode, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) | Error::Internal(_) | Error::Database(_) | Error::Kv(_) => {
                ErrorCode::SystemError
            }
            Error::Validation(_) | Error::UpstreamRejected { .. } => ErrorCode::ValidationError,
            Error::Unauthorized(_) => ErrorCode::AuthenticationError,
            Error::Forbidden(_) => ErrorCode::AuthorizationError,
            Error::NotFound(_) => ErrorCode::ResourceNotFound,
            Error::Conflict { .. } => ErrorCode::ResourceConflict,
            Error::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            Error::Integration(_) => ErrorCode::IntegrationError,
        }
    }
}

/// Error body nested under the response envelope's `error` field
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.code();

        // Upstream passthrough carries its own status code rather than the
        // fixed one `ErrorCode::status` would otherwise pick.
        let status = match &self {
            Error::UpstreamRejected { status, .. } => *status,
            _ => code.status(),
        };

        let (message, details, retry_after) = match self {
            Error::Config(e) => {
                tracing::error!(%e, "configuration error");
                ("internal server error".to_string(), None, None)
            }
            Error::Database(e) => {
                tracing::error!(%e, "database error");
                ("internal server error".to_string(), None, None)
            }
            Error::Kv(e) => {
                tracing::error!(%e, "kv substrate error");
                ("internal server error".to_string(), None, None)
            }
            Error::Validation(msg) => (msg, None, None),
            Error::Unauthorized(msg) => (msg, None, None),
            Error::Forbidden(msg) => (msg, None, None),
            Error::NotFound(msg) => (msg, None, None),
            Error::Conflict { message, details } => (message, details, None),
            Error::RateLimited { retry_after, details } => {
                ("rate limit exceeded".to_string(), details, Some(retry_after))
            }
            Error::Integration(msg) => {
                tracing::warn!(%msg, "upstream integration error");
                (msg, None, None)
            }
            Error::UpstreamRejected { message, .. } => (message, None, None),
            Error::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                ("internal server error".to_string(), None, None)
            }
        };

        let body = crate::responses::Envelope::<()>::error(ErrorBody {
            code,
            message,
            details,
        });

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Database(Box::new(other)),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Kv(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Integration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_validation_to_422() {
        let err = Error::Validation("bad field".into());
        assert_eq!(err.code().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn maps_rate_limited_to_429() {
        let err = Error::RateLimited { retry_after: 60, details: None };
        assert_eq!(err.code().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn maps_conflict_to_409() {
        let err = Error::Conflict { message: "diverging body".into(), details: None };
        assert_eq!(err.code().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ResourceNotFound).unwrap();
        assert_eq!(json, "\"RESOURCE_NOT_FOUND\"");
    }
}
