//! Idempotency record persistence (spec §3 "Idempotency Record", §4.6).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::Result;

#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub api_key_hash: String,
    pub request_hash: String,
    pub response_body: serde_json::Value,
    /// Response headers worth replaying (e.g. `X-Model-Used`), stored as a
    /// flat JSON object of header name to value.
    pub headers: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct IdempotencyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> IdempotencyRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT * FROM idempotency_records WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// Stores the response on success. The idempotency write is the final
    /// step of the request (spec §5 ordering guarantees); a crash before
    /// this runs just means a retry triggers a fresh upstream call.
    pub async fn store(
        &self,
        idempotency_key: &str,
        api_key_hash: &str,
        request_hash: &str,
        response_body: &serde_json::Value,
        headers: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_records (idempotency_key, api_key_hash, request_hash, response_body, headers, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(idempotency_key)
        .bind(api_key_hash)
        .bind(request_hash)
        .bind(response_body)
        .bind(headers)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn purge_older_than(&self, retention_days: i32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM idempotency_records WHERE created_at < now() - ($1 || ' days')::interval",
        )
        .bind(retention_days.to_string())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
