//! Tenant lookups (spec §3 "Tenant"). Tenants are created externally; this
//! repository only needs to confirm a workspace exists and is active.

use sqlx::PgPool;

use crate::error::Result;

pub struct TenantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TenantRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, workspace: &str) -> Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT true FROM tenants WHERE workspace = $1 AND is_active = true",
        )
        .bind(workspace)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }
}
