//! `GET /models`, `GET /models/{id}` (spec §4.4): catalogue listing scoped
//! to the caller's model permissions.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::{
    error::{Error, Result},
    repository::{ApiKeyRecord, CatalogueRepository},
    responses::Envelope,
    state::AppState,
};

pub async fn list_models(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
) -> Result<Json<Envelope<Vec<crate::repository::CatalogueEntry>>>> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let gateway = &state.config().gateway;
    let models: Vec<_> = CatalogueRepository::new(&db)
        .list_active()
        .await?
        .into_iter()
        .filter(|m| api_key.check_model_permission(&m.model_id, &gateway.global_allowlist, &gateway.global_blocklist))
        .collect();

    Ok(Json(Envelope::ok(models)))
}

pub async fn get_model(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Path(model_id): Path<String>,
) -> Result<Json<Envelope<crate::repository::CatalogueEntry>>> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let gateway = &state.config().gateway;
    let entry = CatalogueRepository::new(&db)
        .find(&model_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("model '{model_id}' not found")))?;

    if !api_key.check_model_permission(&entry.model_id, &gateway.global_allowlist, &gateway.global_blocklist) {
        return Err(Error::Forbidden(format!("model '{model_id}' is not allowed for this key")));
    }

    Ok(Json(Envelope::ok(entry)))
}
