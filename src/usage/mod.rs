//! Usage ledger and quota enforcement (spec §4.11).
//!
//! Cost derivation follows `examples/original_source/server/app/core/usage.py::record_usage`:
//! prompt tokens priced at `input_price_per_1k`, completion at
//! `output_price_per_1k`, embedding tokens also at `input_price_per_1k`.

use crate::{
    error::{Error, Result},
    repository::{catalogue::CatalogueEntry, Direction, UsageRepository},
    state::AppState,
};

/// Token counts for a single gateway call, before cost is derived.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub embedding_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens + self.embedding_tokens
    }
}

/// Records up to three ledger rows in one transaction (spec §4.11).
pub async fn record_usage(
    state: &AppState,
    api_key_hash: &str,
    workspace: &str,
    catalogue_entry: &CatalogueEntry,
    usage: TokenUsage,
    metadata: Option<serde_json::Value>,
) -> Result<()> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let entries = [
        (
            Direction::Prompt,
            usage.prompt_tokens,
            price(usage.prompt_tokens, catalogue_entry.input_price_per_1k),
        ),
        (
            Direction::Completion,
            usage.completion_tokens,
            price(usage.completion_tokens, catalogue_entry.output_price_per_1k),
        ),
        (
            Direction::Embedding,
            usage.embedding_tokens,
            price(usage.embedding_tokens, catalogue_entry.input_price_per_1k),
        ),
    ];

    UsageRepository::new(&db)
        .record(api_key_hash, workspace, &catalogue_entry.model_id, &entries, metadata)
        .await
}

fn price(tokens: i64, price_per_1k: f64) -> f64 {
    (tokens as f64 / 1000.0) * price_per_1k
}

/// Quota decision for `check_daily_quota` (spec §4.11).
pub struct QuotaStatus {
    pub allowed: bool,
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
}

pub async fn check_daily_quota(state: &AppState, api_key_hash: &str, daily_quota_tokens: i64) -> Result<QuotaStatus> {
    let db = state
        .db()
        .await
        .ok_or_else(|| Error::Internal("database unavailable".to_string()))?;

    let used = UsageRepository::new(&db).tokens_used_today(api_key_hash).await?;
    let remaining = (daily_quota_tokens - used).max(0);

    Ok(QuotaStatus {
        allowed: used < daily_quota_tokens,
        limit: daily_quota_tokens,
        used,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_proportional_to_tokens_per_thousand() {
        assert_eq!(price(1000, 2.0), 2.0);
        assert!((price(500, 2.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_sums_all_three_directions() {
        let usage = TokenUsage { prompt_tokens: 10, completion_tokens: 20, embedding_tokens: 5 };
        assert_eq!(usage.total(), 35);
    }
}
