//! Usage ledger persistence (spec §3 "Usage Ledger Entry", §4.11).

use serde_json::Value;
use sqlx::PgPool;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Direction {
    Prompt,
    Completion,
    Embedding,
}

pub struct UsageRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UsageRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Appends one ledger row per non-zero direction in a single
    /// transaction (spec §4.11 `record_usage`).
    pub async fn record(
        &self,
        api_key_hash: &str,
        workspace: &str,
        model_id: &str,
        entries: &[(Direction, i64, f64)],
        metadata: Option<Value>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (direction, tokens, cost_usd) in entries {
            if *tokens == 0 {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO usage_ledger (api_key_hash, workspace, model_id, direction, tokens, cost_usd, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(api_key_hash)
            .bind(workspace)
            .bind(model_id)
            .bind(direction)
            .bind(tokens)
            .bind(cost_usd)
            .bind(&metadata)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Sum of `tokens` for `api_key_hash` over the UTC-day window
    /// containing `now` (spec §4.11 `check_daily_quota`).
    pub async fn tokens_used_today(&self, api_key_hash: &str) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(tokens), 0)
            FROM usage_ledger
            WHERE api_key_hash = $1
              AND created_at >= date_trunc('day', now())
              AND created_at < date_trunc('day', now()) + interval '1 day'
            "#,
        )
        .bind(api_key_hash)
        .fetch_one(self.pool)
        .await?;

        Ok(row.0.unwrap_or(0))
    }

    /// Moves ledger rows older than one year into the archive table
    /// (spec §4.12 aggregation job).
    pub async fn archive_rows_older_than_a_year(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO usage_ledger_archive
            SELECT * FROM usage_ledger WHERE created_at < now() - interval '1 year'
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM usage_ledger WHERE created_at < now() - interval '1 year'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Rolls yesterday's ledger rows into `usage_daily_summary`
    /// (spec §4.12 "Aggregation"). Idempotent: re-running for the same day
    /// replaces that day's summary rows.
    pub async fn aggregate_daily(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM usage_daily_summary WHERE summary_date = (current_date - interval '1 day')::date",
        )
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO usage_daily_summary (summary_date, api_key_hash, workspace, model_id, direction, tokens, cost_usd)
            SELECT created_at::date, api_key_hash, workspace, model_id, direction, SUM(tokens), SUM(cost_usd)
            FROM usage_ledger
            WHERE created_at >= date_trunc('day', now() - interval '1 day')
              AND created_at < date_trunc('day', now())
            GROUP BY created_at::date, api_key_hash, workspace, model_id, direction
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
