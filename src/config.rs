//! Configuration management using Figment (spec §6, SPEC_FULL §2)
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (prefix: `GATEWAY_`)
//! 2. `./config.toml` in the current working directory
//! 3. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kv: KvConfig,
    pub upstream: UpstreamConfig,
    pub gateway: GatewayConfig,
    pub memory: MemoryConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// `MAX_REQUEST_SIZE`, bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

/// Postgres connection pool (relational store client, SPEC_FULL §1 component 2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `DATABASE_URL`, must begin `postgres`
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_lazy_init")]
    pub lazy_init: bool,
}

/// Redis connection pool (KV substrate client, SPEC_FULL §1 component 1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// `KV_URL`, must begin `redis`
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_lazy_init")]
    pub lazy_init: bool,
}

/// Upstream provider credentials and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub openrouter_api_key: String,
    #[serde(default = "default_openrouter_base")]
    pub openrouter_api_base: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

/// Rate limiting, quota, and breaker knobs shared by the gateway pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_daily_quota_tokens")]
    pub default_daily_quota_tokens: i64,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
    /// `AUTH_API_KEY_SALT`, must be >= 16 chars
    pub auth_api_key_salt: String,
    #[serde(default = "default_idempotency_retention_days")]
    pub idempotency_retention_days: i64,
    #[serde(default = "default_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub breaker_recovery_timeout_secs: u64,
    #[serde(default = "default_success_threshold")]
    pub breaker_success_threshold: u32,
    /// Tenant-wide model policy and environment fallback (spec §4.4).
    #[serde(default)]
    pub global_allowlist: Vec<String>,
    #[serde(default)]
    pub global_blocklist: Vec<String>,
    #[serde(default = "default_global_default_model")]
    pub global_default_model: String,
    #[serde(default = "default_global_embed_model")]
    pub global_embed_model: String,
}

/// Context-memory engine knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_token_budget")]
    pub default_token_budget: u32,
    #[serde(default = "default_max_context_items")]
    pub max_context_items: u32,
    #[serde(default = "default_embeddings_provider")]
    pub embeddings_provider: String,
    #[serde(default = "default_vector_backend")]
    pub vector_backend: String,
    #[serde(default = "default_per_section_token_budget")]
    pub per_section_token_budget: usize,
}

/// Background job system knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_model_sync_interval_hours")]
    pub model_sync_interval_hours: u32,
    #[serde(default = "default_model_deprecation_days")]
    pub model_deprecation_days: u32,
    #[serde(default = "default_job_timeout_secs")]
    pub default_job_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `./config.toml` (if present) layered under
    /// `GATEWAY_`-prefixed environment variables, layered under defaults.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("GATEWAY_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, bypassing the CWD lookup. Used by tests.
    pub fn load_from(path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("postgres") {
            return Err(crate::error::Error::Validation(
                "DATABASE_URL must begin with postgres".into(),
            ));
        }
        if !self.kv.url.starts_with("redis") {
            return Err(crate::error::Error::Validation(
                "KV_URL must begin with redis".into(),
            ));
        }
        if self.gateway.auth_api_key_salt.len() < 16 {
            return Err(crate::error::Error::Validation(
                "AUTH_API_KEY_SALT must be at least 16 characters".into(),
            ));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connection_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                log_level: default_log_level(),
                environment: default_environment(),
                max_request_size: default_max_request_size(),
                request_timeout_secs: default_request_timeout_secs(),
                cors_mode: default_cors_mode(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/cmg_gateway".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connection_timeout_secs: default_connection_timeout(),
                max_retries: default_max_retries(),
                retry_delay_secs: default_retry_delay(),
                lazy_init: default_lazy_init(),
            },
            kv: KvConfig {
                url: "redis://localhost:6379".to_string(),
                max_connections: default_redis_max_connections(),
                connection_timeout_secs: default_connection_timeout(),
                max_retries: default_max_retries(),
                retry_delay_secs: default_retry_delay(),
                lazy_init: default_lazy_init(),
            },
            upstream: UpstreamConfig {
                openrouter_api_key: String::new(),
                openrouter_api_base: default_openrouter_base(),
                max_output_tokens: default_max_output_tokens(),
                max_temperature: default_max_temperature(),
                call_timeout_secs: default_call_timeout_secs(),
            },
            gateway: GatewayConfig {
                default_daily_quota_tokens: default_daily_quota_tokens(),
                rate_limit_requests: default_rate_limit_requests(),
                rate_limit_window_secs: default_rate_limit_window(),
                auth_api_key_salt: "development-salt-change-me".to_string(),
                idempotency_retention_days: default_idempotency_retention_days(),
                breaker_failure_threshold: default_failure_threshold(),
                breaker_recovery_timeout_secs: default_recovery_timeout_secs(),
                breaker_success_threshold: default_success_threshold(),
                global_allowlist: Vec::new(),
                global_blocklist: Vec::new(),
                global_default_model: default_global_default_model(),
                global_embed_model: default_global_embed_model(),
            },
            memory: MemoryConfig {
                default_token_budget: default_token_budget(),
                max_context_items: default_max_context_items(),
                embeddings_provider: default_embeddings_provider(),
                vector_backend: default_vector_backend(),
                per_section_token_budget: default_per_section_token_budget(),
            },
            jobs: JobsConfig {
                model_sync_interval_hours: default_model_sync_interval_hours(),
                model_deprecation_days: default_model_deprecation_days(),
                default_job_timeout_secs: default_job_timeout_secs(),
            },
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_log_level() -> String { "info".to_string() }
fn default_environment() -> String { "development".to_string() }
fn default_max_request_size() -> usize { 10 * 1024 * 1024 }
fn default_request_timeout_secs() -> u64 { 310 }
fn default_cors_mode() -> String { "permissive".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connection_timeout() -> u64 { 10 }
fn default_max_retries() -> u32 { 5 }
fn default_retry_delay() -> u64 { 2 }
fn default_lazy_init() -> bool { true }
fn default_redis_max_connections() -> usize { 50 }
fn default_openrouter_base() -> String { "https://openrouter.ai/api/v1".to_string() }
fn default_max_output_tokens() -> u32 { 4096 }
fn default_max_temperature() -> f64 { 2.0 }
fn default_call_timeout_secs() -> u64 { 300 }
fn default_daily_quota_tokens() -> i64 { 1_000_000 }
fn default_rate_limit_requests() -> u32 { 60 }
fn default_rate_limit_window() -> u64 { 60 }
fn default_idempotency_retention_days() -> i64 { 7 }
fn default_failure_threshold() -> u32 { 5 }
fn default_recovery_timeout_secs() -> u64 { 30 }
fn default_success_threshold() -> u32 { 2 }
fn default_global_default_model() -> String { "openai/gpt-4o-mini".to_string() }
fn default_global_embed_model() -> String { "openai/text-embedding-3-small".to_string() }
fn default_token_budget() -> u32 { 8000 }
fn default_max_context_items() -> u32 { 40 }
fn default_embeddings_provider() -> String { "upstream".to_string() }
fn default_vector_backend() -> String { "pg".to_string() }
fn default_per_section_token_budget() -> usize { 400 }
fn default_model_sync_interval_hours() -> u32 { 6 }
fn default_model_deprecation_days() -> u32 { 30 }
fn default_job_timeout_secs() -> u64 { 120 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.memory.default_token_budget, 8000);
        assert_eq!(config.gateway.rate_limit_requests, 60);
    }

    #[test]
    fn validate_rejects_short_salt() {
        let mut config = Config::default();
        config.gateway.auth_api_key_salt = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_postgres_url() {
        let mut config = Config::default();
        config.database.url = "mysql://localhost/db".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bind_addr_formats_host_and_port() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }
}
