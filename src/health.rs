//! Liveness and readiness probe handlers (`GET /v1/health`, `GET /v1/ready`)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness probe. Always 200 while the process is running.
pub async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: "cmg-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness probe: checks the Postgres and Redis connections are live.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let mut dependencies = HashMap::new();
    let mut all_ready = true;

    match state.db().await {
        Some(db_pool) => match sqlx::query("SELECT 1").fetch_one(&db_pool).await {
            Ok(_) => {
                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus { healthy: true, message: Some("connected".to_string()) },
                );
            }
            Err(e) => {
                tracing::error!(%e, "database health check failed");
                all_ready = false;
                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus { healthy: false, message: Some(format!("query failed: {e}")) },
                );
            }
        },
        None => {
            let message = if state.config().database.lazy_init {
                "connection initializing (lazy mode)".to_string()
            } else {
                "not connected".to_string()
            };
            all_ready = false;
            dependencies.insert("database".to_string(), DependencyStatus { healthy: false, message: Some(message) });
        }
    }

    match state.kv().await {
        Some(kv_pool) => match kv_pool.get().await {
            Ok(mut conn) => {
                use std::ops::DerefMut;
                match redis::cmd("PING").query_async::<String>(conn.deref_mut()).await {
                    Ok(_) => {
                        dependencies.insert(
                            "kv".to_string(),
                            DependencyStatus { healthy: true, message: Some("connected".to_string()) },
                        );
                    }
                    Err(e) => {
                        tracing::error!(%e, "kv ping failed");
                        all_ready = false;
                        dependencies.insert(
                            "kv".to_string(),
                            DependencyStatus { healthy: false, message: Some(format!("ping failed: {e}")) },
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(%e, "failed to get kv connection");
                all_ready = false;
                dependencies.insert(
                    "kv".to_string(),
                    DependencyStatus { healthy: false, message: Some(format!("pool error: {e}")) },
                );
            }
        },
        None => {
            let message = if state.config().kv.lazy_init {
                "connection initializing (lazy mode)".to_string()
            } else {
                "not connected".to_string()
            };
            all_ready = false;
            dependencies.insert("kv".to_string(), DependencyStatus { healthy: false, message: Some(message) });
        }
    }

    let response = ReadinessResponse {
        ready: all_ready,
        service: "cmg-gateway".to_string(),
        dependencies,
    };

    let status = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}

/// Connection pool metrics endpoint, for monitoring and capacity planning.
pub async fn pool_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool_health().await;
    let status = if health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_reports_healthy() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "cmg-gateway".to_string(),
            version: "0.1.0".to_string(),
        };
        assert_eq!(response.status, "healthy");
    }

    #[test]
    fn dependency_status_carries_message() {
        let status = DependencyStatus { healthy: true, message: Some("ok".to_string()) };
        assert!(status.healthy);
    }
}
