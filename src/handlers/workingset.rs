//! `POST /workingset` (spec §4.10): retrieve then assemble the compact
//! structured context object handed to a downstream agent.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::{
    error::Result,
    memory::{retrieve, workingset},
    repository::ApiKeyRecord,
    responses::Envelope,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WorkingSetRequest {
    pub thread_id: String,
    #[serde(default)]
    pub purpose: String,
    pub token_budget: Option<u32>,
}

pub async fn build_working_set(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Json(request): Json<WorkingSetRequest>,
) -> Result<Json<Envelope<workingset::WorkingSet>>> {
    let result = retrieve(&state, &api_key.workspace, &request.thread_id, &request.purpose, request.token_budget).await?;
    let per_section_budget = state.config().memory.per_section_token_budget;
    let working_set = workingset::build(&result, &request.purpose, per_section_budget);

    Ok(Json(Envelope::ok(working_set)))
}
