//! Provider catalogue fetch + upsert, invoked by the catalogue-sync job
//! (spec §4.12).

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    repository::CatalogueRepository,
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct ProviderModelList {
    data: Vec<ProviderModel>,
}

#[derive(Debug, Deserialize)]
struct ProviderModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<i32>,
    #[serde(default)]
    pricing: Option<ProviderPricing>,
    #[serde(default)]
    architecture: Option<ProviderArchitecture>,
}

#[derive(Debug, Deserialize)]
struct ProviderPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderArchitecture {
    #[serde(default)]
    modality: Option<String>,
}

/// Fetches the full provider model listing and upserts every entry,
/// deprecating any previously-active model absent from this sync.
pub async fn sync_catalogue(state: &AppState) -> Result<SyncReport> {
    let upstream = &state.config().upstream;
    let url = format!("{}/models", upstream.openrouter_api_base.trim_end_matches('/'));

    let response = state
        .upstream_client()
        .get(&url)
        .bearer_auth(&upstream.openrouter_api_key)
        .send()
        .await?
        .error_for_status()?;

    let listing: ProviderModelList = response.json().await?;

    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;
    let repo = CatalogueRepository::new(&db);

    let mut seen = Vec::with_capacity(listing.data.len());
    for model in &listing.data {
        let is_embedding_model = model
            .architecture
            .as_ref()
            .and_then(|a| a.modality.as_deref())
            .map(|m| m.contains("embedding"))
            .unwrap_or(false);

        let input_price = model
            .pricing
            .as_ref()
            .and_then(|p| p.prompt.as_deref())
            .and_then(|p| p.parse::<f64>().ok())
            .map(|per_token| per_token * 1000.0)
            .unwrap_or(0.0);

        let output_price = model
            .pricing
            .as_ref()
            .and_then(|p| p.completion.as_deref())
            .and_then(|p| p.parse::<f64>().ok())
            .map(|per_token| per_token * 1000.0)
            .unwrap_or(0.0);

        repo.upsert_seen(
            &model.id,
            provider_from_model_id(&model.id),
            model.name.as_deref().unwrap_or(&model.id),
            model.context_length.unwrap_or(0),
            input_price,
            output_price,
            false,
            false,
            false,
            is_embedding_model,
        )
        .await?;

        seen.push(model.id.clone());
    }

    let jobs_config = &state.config().jobs;
    let missed_sync_threshold = ((jobs_config.model_deprecation_days as u64 * 24)
        / jobs_config.model_sync_interval_hours.max(1) as u64)
        .max(1) as i32;
    let deprecated = repo.deprecate_unseen(&seen, missed_sync_threshold).await?;

    Ok(SyncReport {
        models_seen: seen.len(),
        models_deprecated: deprecated,
    })
}

fn provider_from_model_id(model_id: &str) -> &str {
    model_id.split('/').next().unwrap_or(model_id)
}

pub struct SyncReport {
    pub models_seen: usize,
    pub models_deprecated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_the_slash_prefix() {
        assert_eq!(provider_from_model_id("openai/gpt-4o-mini"), "openai");
        assert_eq!(provider_from_model_id("standalone"), "standalone");
    }
}
