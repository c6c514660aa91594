//! `GET /expand/{id}`, `GET /expand/{id}/raw` (spec §4.9 "expansion"):
//! fetches one item by id, dispatching on its id-prefix convention, and
//! bumps its expansion usage stat.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Extension,
};
use axum::http::StatusCode;

use crate::{
    error::{Error, Result},
    repository::{ApiKeyRecord, ContextItemRepository, UsageField},
    responses::Envelope,
    state::AppState,
};

async fn bump_expansions(state: &AppState, workspace: &str, item_id: &str) {
    if let Err(e) = crate::memory::consolidator::apply_feedback(state, workspace, item_id, UsageField::Expansions).await {
        tracing::warn!(%e, "failed to record expansion usage stat");
    }
}

pub async fn expand(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Path(id): Path<String>,
) -> Result<Response> {
    let db = state.db().await.ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let repo = ContextItemRepository::new(&db);

    let response = if id.starts_with("CODE:") {
        let row = repo
            .find_artifact(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact '{id}' not found")))?;
        Envelope::ok(serde_json::json!({
            "artifact_ref": row.artifact_ref,
            "thread_id": row.thread_id,
            "role": row.role,
            "hash": row.hash,
            "neighbors": row.neighbors,
        }))
        .into_response()
    } else if id.starts_with('E') {
        let row = repo
            .find_episodic(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("episodic item '{id}' not found")))?;
        Envelope::ok(serde_json::json!({
            "id": row.id,
            "thread_id": row.thread_id,
            "kind": row.kind,
            "title": row.title,
            "snippet": row.snippet,
            "source": row.source,
            "created_at": row.created_at,
        }))
        .into_response()
    } else {
        let row = repo
            .find_semantic(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("semantic item '{id}' not found")))?;
        Envelope::ok(serde_json::json!({
            "id": row.id,
            "thread_id": row.thread_id,
            "kind": row.kind,
            "title": row.title,
            "body": row.body,
            "status": row.status,
            "tags": row.tags,
            "salience": row.salience,
            "updated_at": row.updated_at,
        }))
        .into_response()
    };

    bump_expansions(&state, &api_key.workspace, &id).await;
    Ok(response)
}

pub async fn expand_raw(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Path(id): Path<String>,
) -> Result<Response> {
    let db = state.db().await.ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let repo = ContextItemRepository::new(&db);

    let raw = if id.starts_with("CODE:") {
        repo.find_artifact(&id).await?.map(|row| row.artifact_ref)
    } else if id.starts_with('E') {
        repo.find_episodic(&id).await?.map(|row| row.snippet)
    } else {
        repo.find_semantic(&id).await?.map(|row| row.body)
    };

    let raw = raw.ok_or_else(|| Error::NotFound(format!("item '{id}' not found")))?;

    bump_expansions(&state, &api_key.workspace, &id).await;
    Ok((StatusCode::OK, raw).into_response())
}
