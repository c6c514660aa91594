//! `POST /recall` (spec §4.9): scored retrieval over a thread's context
//! items under an optional token budget.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::{
    error::Result,
    memory::retrieve,
    repository::ApiKeyRecord,
    responses::Envelope,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub thread_id: String,
    #[serde(default)]
    pub purpose: String,
    pub token_budget: Option<u32>,
}

pub async fn recall(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Json(request): Json<RecallRequest>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let result = retrieve(&state, &api_key.workspace, &request.thread_id, &request.purpose, request.token_budget).await?;

    let scored: Vec<serde_json::Value> = result
        .scored
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.item.id(),
                "score": s.score,
                "token_estimate": s.token_estimate,
            })
        })
        .collect();

    Ok(Json(Envelope::ok(serde_json::json!({
        "focus_ids": result.focus_ids,
        "artifact_refs": result.artifact_refs,
        "token_estimate": result.token_estimate,
        "scored": scored,
    }))))
}
