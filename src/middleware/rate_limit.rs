//! Per-tenant and per-IP request-rate middleware (spec §4.1), grounded on
//! the INCR/EXPIRE round-trip pattern from the teacher's Redis rate limiter,
//! generalized to the token-bucket contract in `resilience::ratelimit`.
//!
//! Three limiter variants: per-key RPM, per-key RPH (a 60x-scaled window
//! over the same per-key override, for callers that burst within a minute
//! but should still be capped over an hour), and per-IP, which uses the
//! global config only since there is no per-IP override concept. Key-scoped
//! limits fail closed (deny on substrate failure); IP limits fail open,
//! matching the spec's explicit tradeoff.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::{error::Error, repository::ApiKeyRecord, resilience::ratelimit::consume, state::AppState};

pub async fn key_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(api_key) = request.extensions().get::<ApiKeyRecord>().cloned() else {
        return Ok(next.run(request).await);
    };

    let gateway = &state.config().gateway;
    let Some(kv) = state.kv().await else {
        // Fail closed: we cannot account a key-scoped limit without the substrate.
        return Err(Error::Internal("rate limiter substrate unavailable".into()));
    };

    let limit = api_key.rpm_limit.unwrap_or(gateway.rate_limit_requests as i32).max(0) as u64;
    let key = format!("ratelimit:key:{}", api_key.id);
    let decision = consume(&kv, state.breakers(), &key, limit, gateway.rate_limit_window_secs, 1).await?;

    if !decision.allowed {
        return Err(Error::RateLimited {
            retry_after: decision.retry_after_secs,
            details: None,
        });
    }

    let mut response = next.run(request).await;
    insert_rate_limit_headers(&mut response, limit, decision.remaining);
    Ok(response)
}

/// Per-key requests-per-hour ceiling (spec §4.1's third limiter variant):
/// the same `rpm_limit` override scaled 60x over a 60x window, catching
/// callers that stay under the per-minute cap but hammer the key all hour.
pub async fn key_rph_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(api_key) = request.extensions().get::<ApiKeyRecord>().cloned() else {
        return Ok(next.run(request).await);
    };

    let gateway = &state.config().gateway;
    let Some(kv) = state.kv().await else {
        return Err(Error::Internal("rate limiter substrate unavailable".into()));
    };

    let rpm = api_key.rpm_limit.unwrap_or(gateway.rate_limit_requests as i32).max(0) as u64;
    let limit = rpm.saturating_mul(60);
    let window_secs = gateway.rate_limit_window_secs.saturating_mul(60);
    let key = format!("ratelimit:key-hourly:{}", api_key.id);
    let decision = consume(&kv, state.breakers(), &key, limit, window_secs, 1).await?;

    if !decision.allowed {
        return Err(Error::RateLimited {
            retry_after: decision.retry_after_secs,
            details: None,
        });
    }

    Ok(next.run(request).await)
}

pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let gateway = &state.config().gateway;
    let Some(kv) = state.kv().await else {
        tracing::warn!("IP rate limiter skipped: KV substrate unavailable");
        return Ok(next.run(request).await);
    };

    let key = format!("ratelimit:ip:{}", addr.ip());
    // IP limits are 2x more lenient than per-key limits (spec §4.1).
    let decision = consume(
        &kv,
        state.breakers(),
        &key,
        gateway.rate_limit_requests as u64 * 2,
        gateway.rate_limit_window_secs,
        1,
    )
    .await;

    match decision {
        Ok(decision) if !decision.allowed => Err(Error::RateLimited {
            retry_after: decision.retry_after_secs,
            details: None,
        }),
        Ok(_) => Ok(next.run(request).await),
        Err(e) => {
            tracing::warn!(%e, "IP rate limiter failed open");
            Ok(next.run(request).await)
        }
    }
}

fn insert_rate_limit_headers(response: &mut Response, limit: u64, remaining: u64) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
}
