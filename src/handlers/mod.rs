//! Route wiring for the gateway surface (spec §4.1/§4.13 endpoint table).
//!
//! Per-state middleware (auth, rate limiting, quota, idempotency, metrics)
//! is applied here; the stateless global layers (CORS, compression,
//! tracing, ...) are applied in [`crate::server::Server::serve`].

pub mod chat;
pub mod embeddings;
pub mod expand;
pub mod feedback;
pub mod ingest;
pub mod models;
pub mod recall;
pub mod workingset;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{health, middleware as gw_middleware, state::AppState};

/// Assembles the full router: a public probe surface and a protected API
/// surface behind auth/rate-limit/quota/idempotency, both wrapped in the
/// IP rate limiter, security headers, and request metrics.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/llm/chat", post(chat::chat))
        .route("/embeddings", post(embeddings::embeddings))
        .route("/models", get(models::list_models))
        .route("/models/{id}", get(models::get_model))
        .route("/ingest", post(ingest::ingest))
        .route("/recall", post(recall::recall))
        .route("/workingset", post(workingset::build_working_set))
        .route("/expand/{id}", get(expand::expand))
        .route("/expand/{id}/raw", get(expand::expand_raw))
        .route("/feedback", post(feedback::feedback))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::idempotency_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::quota_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::key_rph_rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::key_rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::auth_middleware));

    let public = Router::new()
        .route("/healthz", get(health::health))
        .route("/readyz", get(health::readiness))
        .route("/pool-metrics", get(health::pool_metrics));

    let app = Router::new()
        .merge(protected)
        .merge(public)
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::ip_rate_limit_middleware))
        .layer(middleware::from_fn(gw_middleware::envelope_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), gw_middleware::metrics_middleware))
        .with_state(state);

    gw_middleware::apply_security_headers(app)
}

#[cfg(test)]
mod tests {
    //! Router-level smoke tests (spec §8 seed scenarios 1-4, the parts that
    //! don't require a live Postgres/Redis substrate): public probe routes
    //! are reachable, protected routes enforce auth before touching the
    //! database, unknown routes 404, and security headers are present on
    //! every response.

    use std::net::SocketAddr;

    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    async fn test_state() -> AppState {
        let mut config = Config::default();
        config.database.lazy_init = true;
        config.kv.lazy_init = true;
        AppState::builder(config).build().await.unwrap()
    }

    fn with_peer(mut request: Request<Body>) -> Request<Body> {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let app = build_router(test_state().await);

        let request = with_peer(Request::builder().uri("/healthz").body(Body::empty()).unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_without_api_key_is_unauthorized() {
        let app = build_router(test_state().await);

        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/llm/chat")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
                .unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_with_malformed_api_key_is_unauthorized() {
        let app = build_router(test_state().await);

        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/llm/chat")
                .header("x-api-key", "not-a-real-key")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
                .unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = build_router(test_state().await);

        let request = with_peer(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = build_router(test_state().await);

        let request = with_peer(Request::builder().uri("/healthz").body(Body::empty()).unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert!(response.headers().contains_key("x-content-type-options"));
    }
}
