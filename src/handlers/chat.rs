//! `POST /llm/chat` (spec §4.5, §6): unary or SSE-streamed chat completion,
//! behind model resolution, upstream proxying, and usage metering.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum::response::sse::{KeepAlive, Sse};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    models::{resolve_model, Purpose},
    repository::ApiKeyRecord,
    responses::Envelope,
    state::AppState,
    upstream::{call_upstream, estimate_tokens, relay_stream},
    usage::{record_usage, TokenUsage},
};

pub async fn chat(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Json(mut body): Json<Value>,
) -> Result<Response> {
    let requested_model = body.get("model").and_then(|v| v.as_str()).map(str::to_string);
    if body.get("messages").and_then(|v| v.as_array()).is_none_or(|m| m.is_empty()) {
        return Err(Error::Validation("request must include a non-empty 'messages' array".to_string()));
    }

    let stream = body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);

    let gateway = &state.config().gateway;
    let entry = resolve_model(
        &state,
        requested_model.as_deref(),
        &api_key,
        Purpose::Chat,
        &gateway.global_allowlist,
        &gateway.global_blocklist,
        &gateway.global_default_model,
        &gateway.global_embed_model,
    )
    .await?;

    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), Value::String(entry.model_id.clone()));
    }

    if stream {
        let (events, handle) = relay_stream(&state, "/chat/completions", &body).await?;

        let state = state.clone();
        let api_key_hash = api_key.key_hash.clone();
        let workspace = api_key.workspace.clone();
        let entry_for_usage = entry.clone();

        tokio::spawn(async move {
            let Ok(outcome) = handle.await else { return };

            let usage = match outcome.usage {
                Some(value) => TokenUsage {
                    prompt_tokens: value.get("prompt_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
                    completion_tokens: value.get("completion_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
                    embedding_tokens: 0,
                },
                None => TokenUsage {
                    prompt_tokens: 0,
                    completion_tokens: estimate_tokens(&outcome.assistant_text),
                    embedding_tokens: 0,
                },
            };

            if let Err(e) = record_usage(&state, &api_key_hash, &workspace, &entry_for_usage, usage, None).await {
                tracing::warn!(%e, "failed to record streamed chat usage");
            }
        });

        let mut response = Sse::new(events).keep_alive(KeepAlive::default()).into_response();
        if let Ok(v) = axum::http::HeaderValue::from_str(&entry.model_id) {
            response.headers_mut().insert("X-Model-Used", v);
        }
        return Ok(response);
    }

    let unary = call_upstream(&state, "/chat/completions", &entry.model_id, &body).await?;

    let usage = TokenUsage {
        prompt_tokens: unary.body.get("usage").and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_i64()).unwrap_or(0),
        completion_tokens: unary.body.get("usage").and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_i64()).unwrap_or(0),
        embedding_tokens: 0,
    };
    record_usage(&state, &api_key.key_hash, &api_key.workspace, &entry, usage, None).await?;

    let mut response = Envelope::ok(unary.body).into_response();
    if let Ok(v) = axum::http::HeaderValue::from_str(&unary.model_used) {
        response.headers_mut().insert("X-Model-Used", v);
    }
    Ok(response)
}
