//! Built-in job handlers, dispatched by `job_type` (spec §4.12).

pub mod aggregation;
pub mod catalogue_sync;
pub mod cleanup;
pub mod embeddings;

use crate::{error::{Error, Result}, state::AppState};

pub async fn dispatch(state: &AppState, job_type: &str, params: &serde_json::Value) -> Result<serde_json::Value> {
    match job_type {
        "catalogue_sync" => catalogue_sync::run(state, params).await,
        "embeddings" => embeddings::run(state, params).await,
        "cleanup" => cleanup::run(state, params).await,
        "aggregation" => aggregation::run(state, params).await,
        other => Err(Error::Validation(format!("unknown job type '{other}'"))),
    }
}
