//! Model resolution (spec §4.4).

use crate::{
    error::{Error, Result},
    repository::{ApiKeyRecord, CatalogueEntry, CatalogueRepository, ModelStatus},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Chat,
    Embeddings,
}

/// `resolve_model(requested, api_key, purpose)` per spec §4.4: the first
/// live, permitted, capability-matching candidate in resolution order wins.
pub async fn resolve_model(
    state: &AppState,
    requested_model: Option<&str>,
    api_key: &ApiKeyRecord,
    purpose: Purpose,
    global_allowlist: &[String],
    global_blocklist: &[String],
    global_default_model: &str,
    global_embed_model: &str,
) -> Result<CatalogueEntry> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let catalogue = CatalogueRepository::new(&db);

    let key_default = match purpose {
        Purpose::Embeddings => api_key.default_embed_model.as_deref(),
        Purpose::Chat => api_key.default_chat_model.as_deref(),
    };

    let tenant_default = match purpose {
        Purpose::Embeddings => global_embed_model,
        Purpose::Chat => global_default_model,
    };

    let candidates = [requested_model, key_default, Some(tenant_default)];

    for candidate in candidates.into_iter().flatten() {
        match catalogue.find(candidate).await? {
            None => continue,
            Some(entry) => {
                if entry.status != ModelStatus::Active {
                    continue;
                }
                if entry.is_embedding_model != (purpose == Purpose::Embeddings) {
                    continue;
                }
                if !api_key.check_model_permission(&entry.model_id, global_allowlist, global_blocklist) {
                    return Err(Error::Forbidden(format!(
                        "model '{}' is not allowed for this key",
                        entry.model_id
                    )));
                }
                return Ok(entry);
            }
        }
    }

    Err(Error::NotFound(
        "no suitable model found for this request".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_equality_distinguishes_chat_and_embeddings() {
        assert_ne!(Purpose::Chat, Purpose::Embeddings);
    }
}
