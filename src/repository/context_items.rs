//! Context-item persistence: semantic items, episodic items, artifacts, and
//! their usage stats (spec §3 "Semantic/Episodic Item", "Artifact", "Usage
//! Stats (per item)").

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::error::Result;

#[derive(Debug, Clone, FromRow)]
pub struct SemanticItemRow {
    pub id: String,
    pub thread_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub salience: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EpisodicItemRow {
    pub id: String,
    pub thread_id: String,
    pub kind: String,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub hash: String,
    pub neighbors: Vec<String>,
    pub salience: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub artifact_ref: String,
    pub thread_id: String,
    pub role: String,
    pub hash: String,
    pub neighbors: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageStatsRow {
    pub item_id: String,
    pub workspace: String,
    pub clicks: i64,
    pub references: i64,
    pub expansions: i64,
    pub last_accessed: DateTime<Utc>,
}

pub struct ContextItemRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContextItemRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn semantic_for_thread(&self, thread_id: &str) -> Result<Vec<SemanticItemRow>> {
        let rows = sqlx::query_as::<_, SemanticItemRow>(
            "SELECT * FROM semantic_items WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn episodic_for_thread(&self, thread_id: &str) -> Result<Vec<EpisodicItemRow>> {
        let rows = sqlx::query_as::<_, EpisodicItemRow>(
            "SELECT * FROM episodic_items WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn artifacts_for_thread(&self, thread_id: &str) -> Result<Vec<ArtifactRow>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM artifacts WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_semantic(&self, id: &str) -> Result<Option<SemanticItemRow>> {
        let row = sqlx::query_as::<_, SemanticItemRow>("SELECT * FROM semantic_items WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_episodic(&self, id: &str) -> Result<Option<EpisodicItemRow>> {
        let row = sqlx::query_as::<_, EpisodicItemRow>("SELECT * FROM episodic_items WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_artifact(&self, artifact_ref: &str) -> Result<Option<ArtifactRow>> {
        let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE artifact_ref = $1")
            .bind(artifact_ref)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_semantic(
        &self,
        id: &str,
        thread_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        status: &str,
        tags: &[String],
        links: &[String],
        salience: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO semantic_items (id, thread_id, kind, title, body, status, tags, links, salience, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
            ON CONFLICT (id) DO UPDATE SET
                body = EXCLUDED.body,
                status = EXCLUDED.status,
                tags = EXCLUDED.tags,
                links = EXCLUDED.links,
                salience = GREATEST(semantic_items.salience, EXCLUDED.salience),
                updated_at = now()
            "#,
        )
        .bind(id)
        .bind(thread_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(status)
        .bind(tags)
        .bind(links)
        .bind(salience)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Episodic items are immutable; dedup by id means "existing wins".
    pub async fn insert_episodic_if_absent(
        &self,
        id: &str,
        thread_id: &str,
        kind: &str,
        title: &str,
        snippet: &str,
        source: &str,
        hash: &str,
        salience: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO episodic_items (id, thread_id, kind, title, snippet, source, hash, neighbors, salience, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, '{}', $8, now())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(thread_id)
        .bind(kind)
        .bind(title)
        .bind(snippet)
        .bind(source)
        .bind(hash)
        .bind(salience)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upserts an artifact, merging neighbor lists on conflict. Returns
    /// `true` only when the row was newly inserted, so callers can keep
    /// re-ingestion idempotent (spec §8).
    pub async fn upsert_artifact(
        &self,
        artifact_ref: &str,
        thread_id: &str,
        role: &str,
        hash: &str,
        neighbors: &[String],
    ) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            INSERT INTO artifacts (artifact_ref, thread_id, role, hash, neighbors)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (artifact_ref) DO UPDATE SET
                role = EXCLUDED.role,
                neighbors = (
                    SELECT array_agg(DISTINCT n) FROM unnest(artifacts.neighbors || EXCLUDED.neighbors) AS n
                )
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(artifact_ref)
        .bind(thread_id)
        .bind(role)
        .bind(hash)
        .bind(neighbors)
        .fetch_one(self.pool)
        .await?;
        Ok(row.0)
    }

    /// Total usage counts (clicks + references + expansions) for the given
    /// items within a workspace, used by the retriever's usage-frequency
    /// scoring term. Items with no recorded usage are simply absent.
    pub async fn usage_counts_for_items(
        &self,
        workspace: &str,
        item_ids: &[String],
    ) -> Result<std::collections::HashMap<String, i64>> {
        if item_ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let rows = sqlx::query_as::<_, UsageStatsRow>(
            "SELECT * FROM item_usage_stats WHERE workspace = $1 AND item_id = ANY($2)",
        )
        .bind(workspace)
        .bind(item_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.item_id, r.clicks + r.references + r.expansions))
            .collect())
    }

    pub async fn bump_usage_stat(&self, item_id: &str, workspace: &str, field: UsageField) -> Result<()> {
        let column = field.column();
        let sql = format!(
            r#"
            INSERT INTO item_usage_stats (item_id, workspace, clicks, references, expansions, last_accessed)
            VALUES ($1, $2, 0, 0, 0, now())
            ON CONFLICT (item_id, workspace) DO UPDATE SET
                {column} = item_usage_stats.{column} + 1,
                last_accessed = now()
            "#
        );
        sqlx::query(&sql)
            .bind(item_id)
            .bind(workspace)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_low_salience(&self, salience_floor: f64, older_than_days: i32) -> Result<u64> {
        let mut total = 0u64;

        for table in ["semantic_items", "episodic_items"] {
            let sql = format!(
                "DELETE FROM {table} WHERE salience < $1 AND created_at < now() - ($2 || ' days')::interval"
            );
            let result = sqlx::query(&sql)
                .bind(salience_floor)
                .bind(older_than_days.to_string())
                .execute(self.pool)
                .await?;
            total += result.rows_affected();
        }

        Ok(total)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum UsageField {
    Clicks,
    References,
    Expansions,
}

impl UsageField {
    fn column(self) -> &'static str {
        match self {
            UsageField::Clicks => "clicks",
            UsageField::References => "references",
            UsageField::Expansions => "expansions",
        }
    }
}

/// Raw feedback metadata blob, stored verbatim alongside the salience delta
/// it produced (spec §3 "Feedback Event").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredFeedback {
    pub thread_id: String,
    pub item_id: String,
    pub kind: String,
    pub value: Option<f64>,
    pub metadata: Option<Value>,
}
