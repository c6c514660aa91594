//! # cmg-gateway
//!
//! Multi-tenant HTTP gateway in front of LLM providers, backed by a
//! context-memory engine (extraction, consolidation, retrieval) and a
//! background job system.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmg_gateway::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config);
//!
//!     let state = AppState::builder(config).build().await?;
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind(app_addr()).await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//!     Ok(())
//! }
//! # fn build_router(_s: AppState) -> axum::Router { axum::Router::new() }
//! # fn app_addr() -> &'static str { "0.0.0.0:0" }
//! ```

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ids;
pub mod idempotency;
pub mod jobs;
pub mod kv;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pool_health;
pub mod repository;
pub mod resilience;
pub mod responses;
pub mod server;
pub mod sse;
pub mod state;
pub mod telemetry;
pub mod upstream;
pub mod usage;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::health::{health, readiness};
    pub use crate::ids::{MakeTypedRequestId, RequestId};
    pub use crate::pool_health::PoolHealthSummary;
    pub use crate::responses::{Created, Envelope, Meta, Pagination};
    pub use crate::server::Server;
    pub use crate::state::{AppState, AppStateBuilder};

    pub use crate::observability::init_tracing;

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};
    pub use tokio;
    pub use async_trait::async_trait;
    pub use thiserror::Error as ThisError;
    pub use anyhow::{self, Context as AnyhowContext};
    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
    pub use uuid::Uuid;
    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};
    pub use http::{Method, Uri};
}
