//! Security headers middleware
//!
//! Applies standard HTTP security headers using
//! `tower_http::set_header::SetResponseHeaderLayer`.

use axum::http::HeaderValue;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// Apply a fixed set of security headers appropriate for a JSON API gateway.
pub fn apply_security_headers(mut app: Router) -> Router {
    app = app.layer(SetResponseHeaderLayer::if_not_present(
        http::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ));

    app = app.layer(SetResponseHeaderLayer::if_not_present(
        http::header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    ));

    app = app.layer(SetResponseHeaderLayer::if_not_present(
        http::header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ));

    app
}
