//! `POST /embeddings` (spec §4.5): synchronous single-text embedding call,
//! metered the same way as chat completions.

use axum::{extract::State, Extension, Json};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    memory::embeddings::embed_text,
    models::{resolve_model, Purpose},
    repository::ApiKeyRecord,
    responses::Envelope,
    state::AppState,
    usage::{record_usage, TokenUsage},
};

pub async fn embeddings(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>> {
    let requested_model = body.get("model").and_then(|v| v.as_str());
    let input = body
        .get("input")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("request must include an 'input' string".to_string()))?;

    let gateway = &state.config().gateway;
    let entry = resolve_model(
        &state,
        requested_model,
        &api_key,
        Purpose::Embeddings,
        &gateway.global_allowlist,
        &gateway.global_blocklist,
        &gateway.global_default_model,
        &gateway.global_embed_model,
    )
    .await?;

    let vector = embed_text(&state, &entry.model_id, input).await?;

    let usage = TokenUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
        embedding_tokens: crate::upstream::estimate_tokens(input),
    };
    record_usage(&state, &api_key.key_hash, &api_key.workspace, &entry, usage, None).await?;

    let response = serde_json::json!({
        "model": entry.model_id,
        "data": [{ "embedding": vector, "index": 0 }],
    });

    Ok(Json(Envelope::ok(response)))
}
