//! Model catalogue persistence (spec §3 "Model Catalogue Entry", §4.12
//! catalogue-sync job).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Deprecated,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CatalogueEntry {
    pub model_id: String,
    pub provider: String,
    pub display_name: String,
    pub context_window: i32,
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
    pub supports_tools: bool,
    pub supports_vision: bool,
    pub supports_json_mode: bool,
    pub is_embedding_model: bool,
    pub status: ModelStatus,
    pub last_seen_at: DateTime<Utc>,
    pub missed_syncs: i32,
    pub metadata: Option<Value>,
}

pub struct CatalogueRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogueRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, model_id: &str) -> Result<Option<CatalogueEntry>> {
        let row = sqlx::query_as::<_, CatalogueEntry>(
            "SELECT * FROM model_catalogue WHERE model_id = $1",
        )
        .bind(model_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_active(&self) -> Result<Vec<CatalogueEntry>> {
        let rows = sqlx::query_as::<_, CatalogueEntry>(
            "SELECT * FROM model_catalogue WHERE status = 'active' ORDER BY model_id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Upserts a catalogue row and resets `missed_syncs`, as the sync job
    /// does for every model it sees in the provider's current listing.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_seen(
        &self,
        model_id: &str,
        provider: &str,
        display_name: &str,
        context_window: i32,
        input_price_per_1k: f64,
        output_price_per_1k: f64,
        supports_tools: bool,
        supports_vision: bool,
        supports_json_mode: bool,
        is_embedding_model: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO model_catalogue (
                model_id, provider, display_name, context_window,
                input_price_per_1k, output_price_per_1k,
                supports_tools, supports_vision, supports_json_mode,
                is_embedding_model, status, last_seen_at, missed_syncs
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', now(), 0)
            ON CONFLICT (model_id) DO UPDATE SET
                provider = EXCLUDED.provider,
                display_name = EXCLUDED.display_name,
                context_window = EXCLUDED.context_window,
                input_price_per_1k = EXCLUDED.input_price_per_1k,
                output_price_per_1k = EXCLUDED.output_price_per_1k,
                supports_tools = EXCLUDED.supports_tools,
                supports_vision = EXCLUDED.supports_vision,
                supports_json_mode = EXCLUDED.supports_json_mode,
                is_embedding_model = EXCLUDED.is_embedding_model,
                status = 'active',
                last_seen_at = now(),
                missed_syncs = 0
            "#,
        )
        .bind(model_id)
        .bind(provider)
        .bind(display_name)
        .bind(context_window)
        .bind(input_price_per_1k)
        .bind(output_price_per_1k)
        .bind(supports_tools)
        .bind(supports_vision)
        .bind(supports_json_mode)
        .bind(is_embedding_model)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Bumps `missed_syncs` for every active model not present in
    /// `seen_model_ids`, deprecating those past the configured threshold.
    pub async fn deprecate_unseen(&self, seen_model_ids: &[String], threshold: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE model_catalogue
            SET missed_syncs = missed_syncs + 1,
                status = CASE WHEN missed_syncs + 1 >= $2 THEN 'deprecated' ELSE status END
            WHERE status = 'active' AND NOT (model_id = ANY($1))
            "#,
        )
        .bind(seen_model_ids)
        .bind(threshold)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
