//! API key persistence (spec §3 "API Key", §4.3 auth & policy).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::error::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub id: String,
    pub workspace: String,
    pub name: String,
    pub key_hash: String,
    pub lookup_prefix: String,
    pub is_active: bool,
    pub rpm_limit: Option<i32>,
    pub daily_quota_tokens: Option<i64>,
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
    pub default_chat_model: Option<String>,
    pub default_embed_model: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// spec §4.3 `check_model_permission`: blocklist wins, then allowlist
    /// scoping, else permissive.
    pub fn check_model_permission(
        &self,
        model_id: &str,
        global_allowlist: &[String],
        global_blocklist: &[String],
    ) -> bool {
        if self.blocklist.iter().any(|m| m == model_id) {
            return false;
        }
        if global_blocklist.iter().any(|m| m == model_id) {
            return false;
        }
        if !self.allowlist.is_empty() {
            return self.allowlist.iter().any(|m| m == model_id);
        }
        if !global_allowlist.is_empty() {
            return global_allowlist.iter().any(|m| m == model_id);
        }
        true
    }
}

pub struct ApiKeyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Narrows the table scan to rows sharing the key's `lookup_prefix`
    /// before the caller does the real salted-hash comparison.
    pub async fn find_by_prefix(&self, lookup_prefix: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            SELECT id, workspace, name, key_hash, lookup_prefix, is_active,
                   rpm_limit, daily_quota_tokens, allowlist, blocklist,
                   default_chat_model, default_embed_model, last_used_at, created_at
            FROM api_keys
            WHERE lookup_prefix = $1 AND is_active = true
            "#,
        )
        .bind(lookup_prefix)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn touch_last_used(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Enforces the write-time invariant `allowlist ∩ blocklist = ∅`.
    pub async fn create(
        &self,
        id: &str,
        workspace: &str,
        name: &str,
        key_hash: &str,
        lookup_prefix: &str,
        allowlist: &[String],
        blocklist: &[String],
        metadata: Option<Value>,
    ) -> Result<ApiKeyRecord> {
        if allowlist.iter().any(|m| blocklist.contains(m)) {
            return Err(Error::Validation(
                "allowlist and blocklist must not overlap".to_string(),
            ));
        }

        let record = sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            INSERT INTO api_keys (id, workspace, name, key_hash, lookup_prefix, is_active, allowlist, blocklist, metadata)
            VALUES ($1, $2, $3, $4, $5, true, $6, $7, $8)
            RETURNING id, workspace, name, key_hash, lookup_prefix, is_active,
                      rpm_limit, daily_quota_tokens, allowlist, blocklist,
                      default_chat_model, default_embed_model, last_used_at, created_at
            "#,
        )
        .bind(id)
        .bind(workspace)
        .bind(name)
        .bind(key_hash)
        .bind(lookup_prefix)
        .bind(allowlist)
        .bind(blocklist)
        .bind(metadata)
        .fetch_one(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn revoke(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
