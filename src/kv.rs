//! Redis connection pool management (KV substrate client: idempotency keys,
//! rate-limit token buckets, circuit-breaker state, working-set cache)

use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};
use std::time::Duration;

use crate::{config::KvConfig, error::{Error, Result}, resilience::BreakerRegistry};

/// Breaker name for the KV client itself (spec §5). Deliberately local-only:
/// a breaker that gates access to the substrate cannot also store its state
/// in that same substrate without becoming circular.
const KV_BREAKER_NAME: &str = "kv";

/// Acquires a connection through the `kv`-named circuit breaker. Every
/// caller that would otherwise do a bare `pool.get()` on the rate-limit or
/// job-queue paths should go through this instead, so a substrate outage
/// trips the breaker rather than piling up timed-out connection attempts.
pub async fn guarded_connection(pool: &Pool, breakers: &BreakerRegistry) -> Result<Connection> {
    if !breakers.allow(KV_BREAKER_NAME) {
        return Err(Error::Integration("circuit breaker open for kv substrate".to_string()));
    }

    match pool.get().await {
        Ok(conn) => {
            breakers.record_success(KV_BREAKER_NAME);
            Ok(conn)
        }
        Err(e) => {
            breakers.record_failure(KV_BREAKER_NAME);
            Err(Error::Internal(format!("failed to get KV connection: {e}")))
        }
    }
}

/// Create a Redis connection pool, retrying with exponential backoff.
pub(crate) async fn create_pool(config: &KvConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

async fn create_pool_with_retries(config: &KvConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "KV connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "KV connection pool created: max_connections={}",
                        config.max_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to KV substrate after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                let delay = base_delay * delay_multiplier;

                tracing::warn!(
                    "KV connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &KvConfig) -> Result<Pool> {
    let cfg = DeadpoolConfig::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to build KV pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to create KV pool: {}", e)))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| crate::error::Error::Internal(format!("Failed to get KV connection: {}", e)))?;
    drop(conn);

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_config() {
        let config = KvConfig {
            url: "redis://localhost:6379".to_string(),
            max_connections: 20,
            connection_timeout_secs: 10,
            max_retries: 5,
            retry_delay_secs: 2,
            lazy_init: true,
        };

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.max_retries, 5);
        assert!(config.lazy_init);
    }
}
