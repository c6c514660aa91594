//! The canonical gateway response envelope (spec §4.13).
//!
//! Every non-streaming handler returns `Envelope<T>`; the envelope middleware
//! (`middleware::envelope`) is only responsible for stamping `meta` onto
//! responses that handlers already produced through these constructors, since
//! `request_id`/`version` aren't known inside the handler body.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;

/// API version stamped into every envelope's `meta.version`.
pub const API_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl Meta {
    /// A meta stamp with a placeholder request id; the envelope middleware
    /// overwrites `request_id` with the one generated by `request_tracking`.
    pub fn placeholder() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: String::new(),
            version: API_VERSION.to_string(),
            pagination: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Meta::placeholder(),
        }
    }

    pub fn ok_paginated(data: T, pagination: Pagination) -> Self {
        let mut meta = Meta::placeholder();
        meta.pagination = Some(pagination);
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn error(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            meta: Meta::placeholder(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Wraps a successful payload at 201 Created, still inside the envelope.
pub struct Created<T>(pub Envelope<T>);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_has_no_error() {
        let env = Envelope::ok(serde_json::json!({"id": 1}));
        assert!(env.success);
        assert!(env.error.is_none());
        assert_eq!(env.meta.version, API_VERSION);
    }

    #[test]
    fn error_envelope_has_no_data() {
        let env: Envelope<()> = Envelope::error(ErrorBody {
            code: crate::error::ErrorCode::ValidationError,
            message: "bad".into(),
            details: None,
        });
        assert!(!env.success);
        assert!(env.data.is_none());
    }
}
