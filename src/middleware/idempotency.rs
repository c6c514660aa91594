//! Idempotency lookup layer (spec §4.6): only applies to non-streaming
//! requests carrying an `Idempotency-Key` header. On a stored-response hit,
//! replays it without invoking the handler; on a conflict, returns 409
//! before the handler runs.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use axum::middleware::Next;
use http_body_util::BodyExt;

use crate::{error::Error, idempotency, repository::ApiKeyRecord, responses::Envelope, state::AppState};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Response headers worth replaying on an idempotency-key hit.
const REPLAYABLE_HEADERS: &[&str] = &["x-model-used"];

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(key) = request
        .headers()
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return Ok(next.run(request).await);
    };

    let Some(api_key) = request.extensions().get::<ApiKeyRecord>().cloned() else {
        return Ok(next.run(request).await);
    };

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::Validation(format!("failed to read request body: {e}")))?;
    let json_body: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Validation(format!("request body is not valid JSON: {e}")))?;

    match idempotency::lookup(&state, &key, &api_key.key_hash, &json_body).await? {
        idempotency::Lookup::Replay(stored) => {
            let mut response = Envelope::ok(stored.body).into_response();
            if let Some(headers) = stored.headers.as_object() {
                for (name, value) in headers {
                    let Some(value) = value.as_str() else { continue };
                    if let (Ok(name), Ok(value)) = (
                        axum::http::HeaderName::from_bytes(name.as_bytes()),
                        axum::http::HeaderValue::from_str(value),
                    ) {
                        response.headers_mut().insert(name, value);
                    }
                }
            }
            return Ok(response);
        }
        idempotency::Lookup::Miss => {}
    }

    let request = Request::from_parts(parts, Body::from(bytes.clone()));
    let response = next.run(request).await;

    if !response.status().is_success() {
        return Ok(response);
    }

    let mut stored_headers = serde_json::Map::new();
    for name in REPLAYABLE_HEADERS {
        if let Some(value) = response.headers().get(*name).and_then(|v| v.to_str().ok()) {
            stored_headers.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    let (parts, response_body) = response.into_parts();
    let Ok(collected) = response_body.collect().await else {
        return Ok(Response::from_parts(parts, Body::empty()));
    };
    let response_bytes = collected.to_bytes();

    if let Ok(response_value) = serde_json::from_slice::<serde_json::Value>(&response_bytes) {
        let headers_value = serde_json::Value::Object(stored_headers);
        if let Err(e) = idempotency::store(&state, &key, &api_key.key_hash, &json_body, &response_value, &headers_value).await {
            tracing::warn!(%e, "failed to store idempotency record");
        }
    }

    Ok(Response::from_parts(parts, Body::from(response_bytes)))
}
