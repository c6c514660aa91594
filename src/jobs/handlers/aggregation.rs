//! Aggregation job handler: rolls the prior day's usage ledger rows into
//! `usage_daily_summary` (spec §4.12 "Aggregation").

use crate::{
    error::{Error, Result},
    repository::UsageRepository,
    state::AppState,
};

pub async fn run(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value> {
    let db = state.db().await.ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let rows = UsageRepository::new(&db).aggregate_daily().await?;
    Ok(serde_json::json!({ "summary_rows": rows }))
}
