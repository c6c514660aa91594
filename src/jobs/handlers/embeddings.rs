//! Embedding-generation job handler: single-item and batch variants, skips
//! items that already have a vector, batches up to 50 (spec §4.12).

use crate::{
    error::{Error, Result},
    memory::embeddings::{embed_text, vector_store},
    state::AppState,
};

const MAX_BATCH: usize = 50;

pub async fn run(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value> {
    let item_ids: Vec<String> = params
        .get("item_ids")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if item_ids.is_empty() {
        return Err(Error::Validation("embeddings job requires item_ids".to_string()));
    }

    let model_id = params
        .get("model_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("embeddings job requires model_id".to_string()))?;

    let texts: std::collections::HashMap<String, String> = params
        .get("texts")
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default();

    let db = state.db().await.ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let store = vector_store(&state.config().memory.vector_backend, db);

    let mut embedded = Vec::new();
    let mut skipped = Vec::new();

    for item_id in item_ids.iter().take(MAX_BATCH) {
        if store.has_vector(item_id).await? {
            skipped.push(item_id.clone());
            continue;
        }

        let Some(text) = texts.get(item_id) else {
            skipped.push(item_id.clone());
            continue;
        };

        let vector = embed_text(state, model_id, text).await?;
        store.upsert(item_id, model_id, vector).await?;
        embedded.push(item_id.clone());
    }

    Ok(serde_json::json!({ "embedded": embedded, "skipped": skipped }))
}
