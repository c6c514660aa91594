//! Cleanup job handler: delete low-salience items, archive aged ledger rows
//! (spec §4.12 "Cleanup").

use crate::{
    error::{Error, Result},
    repository::{ContextItemRepository, UsageRepository},
    state::AppState,
};

const SALIENCE_FLOOR: f64 = 0.1;
const STALE_AFTER_DAYS: i32 = 90;

pub async fn run(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value> {
    let db = state.db().await.ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let items_deleted = ContextItemRepository::new(&db)
        .delete_low_salience(SALIENCE_FLOOR, STALE_AFTER_DAYS)
        .await?;
    let ledger_archived = UsageRepository::new(&db).archive_rows_older_than_a_year().await?;

    Ok(serde_json::json!({
        "items_deleted": items_deleted,
        "ledger_rows_archived": ledger_archived,
    }))
}
