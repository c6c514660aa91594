//! Gateway entry point: loads config, builds shared state, spawns the job
//! consumer and scheduler loops, and serves the HTTP router.

use std::time::Duration;

use cmg_gateway::{
    config::Config,
    error::Result,
    handlers::build_router,
    jobs::{drain_all_queues, scheduler::default_schedule},
    observability::init_tracing,
    server::Server,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    let state = AppState::builder(config).build().await?;
    let app = build_router(state.clone());

    spawn_job_consumer(state.clone());
    spawn_scheduler(state.clone());

    let server = Server::new(state.config().clone());
    server.serve(app).await
}

/// Drains every job queue on a fixed interval (spec §4.12).
fn spawn_job_consumer(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            drain_all_queues(&state).await;
        }
    });
}

/// Ticks the cron scheduler on a fixed interval, enqueuing due built-in
/// jobs (catalogue sync, cleanup, usage aggregation).
fn spawn_scheduler(state: AppState) {
    tokio::spawn(async move {
        let mut scheduler = default_schedule();
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(e) = scheduler.tick(&state, chrono::Utc::now()).await {
                tracing::warn!(%e, "scheduler tick failed");
            }
        }
    });
}
