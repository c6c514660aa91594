//! Application state shared across handlers

use deadpool_redis::Pool as KvPool;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::{config::Config, error::Result, resilience::BreakerRegistry, telemetry::MetricsRegistry};

/// Shared application state, handed to every handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    db_pool: Arc<RwLock<Option<PgPool>>>,
    kv_pool: Arc<RwLock<Option<KvPool>>>,
    upstream_client: reqwest::Client,
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn builder(config: Config) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cloned handle to the Postgres pool, if the (possibly lazy) connection
    /// has completed.
    pub async fn db(&self) -> Option<PgPool> {
        self.db_pool.read().await.clone()
    }

    pub fn db_lock(&self) -> &Arc<RwLock<Option<PgPool>>> {
        &self.db_pool
    }

    /// Cloned handle to the Redis pool, if the (possibly lazy) connection
    /// has completed.
    pub async fn kv(&self) -> Option<KvPool> {
        self.kv_pool.read().await.clone()
    }

    pub fn kv_lock(&self) -> &Arc<RwLock<Option<KvPool>>> {
        &self.kv_pool
    }

    pub fn upstream_client(&self) -> &reqwest::Client {
        &self.upstream_client
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub async fn pool_health(&self) -> crate::pool_health::PoolHealthSummary {
        let mut summary = crate::pool_health::PoolHealthSummary::new();

        if let Some(pool) = self.db().await {
            summary.database = Some(crate::pool_health::DatabasePoolHealth::from_pool(
                &pool,
                &self.config.database,
            ));
        }

        if let Some(pool) = self.kv().await {
            summary.kv = Some(crate::pool_health::KvPoolHealth::from_pool(
                &pool,
                &self.config.kv,
            ));
        }

        summary.breakers = self.breakers.stats();
        summary.healthy = summary.is_healthy();
        summary
    }
}

/// Builder for [`AppState`], mirroring the teacher's lazy-vs-eager
/// connection-pool initialization pattern.
pub struct AppStateBuilder {
    config: Config,
    db_pool: Option<PgPool>,
    kv_pool: Option<KvPool>,
}

impl AppStateBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            db_pool: None,
            kv_pool: None,
        }
    }

    pub fn db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn kv_pool(mut self, pool: KvPool) -> Self {
        self.kv_pool = Some(pool);
        self
    }

    pub async fn build(self) -> Result<AppState> {
        let config = self.config;

        let db_pool = if let Some(pool) = self.db_pool {
            Arc::new(RwLock::new(Some(pool)))
        } else if config.database.lazy_init {
            let pool_lock = Arc::new(RwLock::new(None));
            let pool_clone = pool_lock.clone();
            let db_config = config.database.clone();

            tokio::spawn(async move {
                tracing::info!("initiating lazy database connection");
                match crate::database::create_pool(&db_config).await {
                    Ok(pool) => {
                        *pool_clone.write().await = Some(pool);
                        tracing::info!("lazy database connection established");
                    }
                    Err(e) => {
                        tracing::error!("database connection failed: {e}. service is degraded");
                    }
                }
            });

            pool_lock
        } else {
            Arc::new(RwLock::new(Some(crate::database::create_pool(&config.database).await?)))
        };

        let kv_pool = if let Some(pool) = self.kv_pool {
            Arc::new(RwLock::new(Some(pool)))
        } else if config.kv.lazy_init {
            let pool_lock = Arc::new(RwLock::new(None));
            let pool_clone = pool_lock.clone();
            let kv_config = config.kv.clone();

            tokio::spawn(async move {
                tracing::info!("initiating lazy KV connection");
                match crate::kv::create_pool(&kv_config).await {
                    Ok(pool) => {
                        *pool_clone.write().await = Some(pool);
                        tracing::info!("lazy KV connection established");
                    }
                    Err(e) => {
                        tracing::error!("KV connection failed: {e}. service is degraded");
                    }
                }
            });

            pool_lock
        } else {
            Arc::new(RwLock::new(Some(crate::kv::create_pool(&config.kv).await?)))
        };

        let upstream_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream.call_timeout_secs))
            .build()
            .map_err(|e| crate::error::Error::Internal(format!("failed to build upstream client: {e}")))?;

        let breakers = Arc::new(BreakerRegistry::new(
            config.gateway.breaker_failure_threshold,
            config.gateway.breaker_success_threshold,
            config.gateway.breaker_recovery_timeout_secs,
        ));

        Ok(AppState {
            config: Arc::new(config),
            db_pool,
            kv_pool,
            upstream_client,
            breakers,
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_populates_eager_config() {
        let mut config = Config::default();
        config.database.lazy_init = true;
        config.kv.lazy_init = true;

        let state = AppStateBuilder::new(config).build().await.unwrap();
        assert_eq!(state.config().server.port, 8080);
        // Lazy init means the pools aren't populated yet without a real backend.
        assert!(state.db().await.is_none());
    }
}
