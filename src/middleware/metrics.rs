//! Per-request metrics middleware (spec component #17): records the
//! request's method/route/status into the shared `MetricsRegistry`.
//!
//! Grounded on the teacher's `middleware::metrics` layer (same
//! method/route/status labeling), wired against the in-process registry
//! instead of an external OTLP exporter.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    state
        .metrics()
        .record_request(&method, &route, response.status().as_u16(), duration_ms);

    response
}
