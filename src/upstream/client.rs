//! Unary upstream proxying (spec §4.5).

use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    state::AppState,
};

pub struct UnaryResponse {
    pub body: Value,
    pub model_used: String,
}

/// Forwards `body` to the upstream chat-completions or embeddings endpoint
/// through the named circuit breaker, translating upstream status codes per
/// spec §4.5: 401→502, 429→429, ≥500→502, other 4xx passed through.
pub async fn call_upstream(
    state: &AppState,
    path: &str,
    model_used: &str,
    body: &Value,
) -> Result<UnaryResponse> {
    let breaker_name = format!("upstream:{path}");
    let kv = state.kv().await;
    let ttl_secs = state.config().upstream.call_timeout_secs.saturating_mul(10);

    if !state.breakers().allow_kv(kv.as_ref(), &breaker_name, ttl_secs).await {
        return Err(Error::Integration(format!(
            "circuit breaker open for upstream path '{path}'"
        )));
    }

    let upstream = &state.config().upstream;
    let url = format!("{}{}", upstream.openrouter_api_base.trim_end_matches('/'), path);

    let result = state
        .upstream_client()
        .post(&url)
        .bearer_auth(&upstream.openrouter_api_key)
        .json(body)
        .send()
        .await;

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            return Err(Error::from(e));
        }
    };

    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            Err(Error::Integration("upstream rejected credentials".to_string()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            Err(Error::RateLimited { retry_after: 60, details: None })
        }
        s if s.is_server_error() => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            Err(Error::Integration(format!("upstream returned {s}")))
        }
        s if s.is_client_error() => {
            // Passed through: not a breaker failure, the caller's request was malformed.
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            Err(Error::UpstreamRejected { status: s, message: format!("upstream rejected request ({s}): {body}") })
        }
        _ => {
            state.breakers().record_success_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            let body = response.json::<Value>().await?;
            Ok(UnaryResponse { body, model_used: model_used.to_string() })
        }
    }
}
