//! Daily token quota enforcement (spec §4.11): sums ledger tokens for the
//! key over the UTC-day window and denies once the key's (or the gateway
//! default) quota is exhausted.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::{error::Error, repository::ApiKeyRecord, state::AppState, usage::check_daily_quota};

pub async fn quota_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(api_key) = request.extensions().get::<ApiKeyRecord>().cloned() else {
        return Ok(next.run(request).await);
    };

    let quota_limit = api_key
        .daily_quota_tokens
        .unwrap_or(state.config().gateway.default_daily_quota_tokens);

    let status = check_daily_quota(&state, &api_key.key_hash, quota_limit).await?;

    if !status.allowed {
        return Err(Error::RateLimited { retry_after: seconds_until_next_utc_day(), details: None });
    }

    let mut response = next.run(request).await;
    insert_quota_headers(&mut response, &status);
    Ok(response)
}

fn insert_quota_headers(response: &mut Response, status: &crate::usage::QuotaStatus) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&status.limit.to_string()) {
        headers.insert("X-Quota-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&status.used.to_string()) {
        headers.insert("X-Quota-Used", v);
    }
    if let Ok(v) = HeaderValue::from_str(&status.remaining.to_string()) {
        headers.insert("X-Quota-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&seconds_until_next_utc_day().to_string()) {
        headers.insert("X-Quota-Reset", v);
    }
}

fn seconds_until_next_utc_day() -> u64 {
    let now = chrono::Utc::now();
    let tomorrow = (now.date_naive() + chrono::Duration::days(1)).and_hms_opt(0, 0, 0).unwrap();
    (tomorrow.and_utc() - now).num_seconds().max(0) as u64
}
