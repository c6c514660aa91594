//! `POST /ingest` (spec §4.7, §4.8): redact, extract, and consolidate raw
//! thread material, then enqueue embedding generation for what changed.
//! Partial failure still returns 200 (spec §7): a consolidation error for
//! one candidate never rolls back the rest.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    jobs::queue,
    memory::extractor::{extract, Material, MaterialKind},
    memory::consolidator::consolidate,
    repository::ApiKeyRecord,
    responses::Envelope,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct IngestMaterial {
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub thread_id: String,
    pub materials: Vec<IngestMaterial>,
}

fn material_kind(raw: &str) -> MaterialKind {
    match raw {
        "diff" => MaterialKind::Diff,
        "log" => MaterialKind::Log,
        _ => MaterialKind::Chat,
    }
}

pub async fn ingest(
    State(state): State<AppState>,
    Extension(_api_key): Extension<ApiKeyRecord>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Envelope<Value>>> {
    if request.materials.is_empty() {
        return Err(Error::Validation("request must include at least one material".to_string()));
    }

    let materials: Vec<Material<'_>> = request
        .materials
        .iter()
        .map(|m| Material { kind: material_kind(&m.kind), text: m.text.as_str() })
        .collect();

    let extraction = extract(&request.thread_id, &materials);
    let report = consolidate(&state, &request.thread_id, &extraction).await?;

    if !report.added_ids.is_empty() {
        let mut texts = serde_json::Map::new();
        for candidate in &extraction.semantic {
            if report.added_ids.contains(&candidate.id) || report.updated_ids.contains(&candidate.id) {
                texts.insert(candidate.id.clone(), Value::String(candidate.body.clone()));
            }
        }
        for candidate in &extraction.episodic {
            if report.added_ids.contains(&candidate.id) {
                texts.insert(candidate.id.clone(), Value::String(candidate.snippet.clone()));
            }
        }

        if !texts.is_empty() {
            let item_ids: Vec<Value> = texts.keys().cloned().map(Value::String).collect();
            let params = serde_json::json!({
                "item_ids": item_ids,
                "model_id": state.config().gateway.global_embed_model,
                "texts": Value::Object(texts),
            });

            if let Some(kv) = state.kv().await {
                if let Err(e) = queue::enqueue(&kv, state.breakers(), "embeddings", params, "embeddings", state.config().jobs.default_job_timeout_secs).await {
                    tracing::warn!(%e, "failed to enqueue embeddings job after ingest");
                }
            }
        }
    }

    Ok(Json(Envelope::ok(serde_json::json!({
        "added_ids": report.added_ids,
        "updated_ids": report.updated_ids,
    }))))
}
