//! Catalogue-sync job handler: wires `models::sync_catalogue` into the job
//! system (spec §4.12 "Catalogue sync").

use crate::{error::Result, models::sync_catalogue, state::AppState};

pub async fn run(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value> {
    let report = sync_catalogue(state).await?;
    Ok(serde_json::json!({
        "models_seen": report.models_seen,
        "models_deprecated": report.models_deprecated,
    }))
}
