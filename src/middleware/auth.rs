//! API-key authentication layer (spec §4.3): accepts the key from
//! `X-API-Key` or `Authorization: Bearer <key>`, verifies the salted hash,
//! and attaches `AuthenticatedTenant` to the request.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    auth::{ApiKeyGenerator, AuthenticatedTenant},
    error::{Error, Result},
    repository::{ApiKeyRecord, ApiKeyRepository, TenantRepository},
    state::AppState,
};

fn extract_key(request: &Request<Body>) -> Option<String> {
    if let Some(value) = request.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }

    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let Some(key) = extract_key(&request) else {
        return Err(Error::Unauthorized("missing API key".to_string()));
    };

    let record = authenticate(&state, &key).await?;

    request.extensions_mut().insert(AuthenticatedTenant {
        tenant_id: record.workspace.clone(),
        api_key_id: record.id.clone(),
    });
    request.extensions_mut().insert(record);

    Ok(next.run(request).await)
}

async fn authenticate(state: &AppState, key: &str) -> Result<ApiKeyRecord> {
    let Some(lookup_prefix) = ApiKeyGenerator::lookup_prefix(key) else {
        return Err(Error::Unauthorized("malformed API key".to_string()));
    };

    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let generator = ApiKeyGenerator::new("gw", &state.config().gateway.auth_api_key_salt);
    let candidates = ApiKeyRepository::new(&db).find_by_prefix(&lookup_prefix).await?;

    let record = candidates
        .into_iter()
        .find(|candidate| generator.verify(key, &candidate.key_hash).unwrap_or(false))
        .ok_or_else(|| Error::Unauthorized("invalid API key".to_string()))?;

    if !record.is_active {
        return Err(Error::Unauthorized("API key is not active".to_string()));
    }

    if !TenantRepository::new(&db).exists(&record.workspace).await? {
        return Err(Error::Unauthorized("workspace is not active".to_string()));
    }

    ApiKeyRepository::new(&db).touch_last_used(&record.id).await?;

    Ok(record)
}
