//! Background job system: named queues, durable KV records, a
//! work-stealing consumer, and a cron-driven scheduler (spec §4.12).

pub mod handlers;
pub mod queue;
pub mod scheduler;

use std::time::Duration;

use crate::state::AppState;

pub const QUEUES: [&str; 5] = ["default", "sync", "embeddings", "cleanup", "analytics"];

/// Claims and runs one job from `queue_name`, enforcing `timeout_secs` as a
/// hard deadline (spec §5 "Cancellation & timeouts"). Returns `false` when
/// the queue was empty.
pub async fn run_one(state: &AppState, queue_name: &str) -> crate::error::Result<bool> {
    let Some(pool) = state.kv().await else {
        return Ok(false);
    };

    let breakers = state.breakers();
    let Some(job) = queue::claim_next(&pool, breakers, queue_name).await? else {
        return Ok(false);
    };

    let deadline = Duration::from_secs(job.timeout_secs);
    match tokio::time::timeout(deadline, handlers::dispatch(state, &job.job_type, &job.params)).await {
        Ok(Ok(_)) => queue::mark_succeeded(&pool, breakers, &job.id).await?,
        Ok(Err(e)) => {
            tracing::warn!(job_id = %job.id, job_type = %job.job_type, %e, "job failed");
            queue::mark_failed(&pool, breakers, &job.id, &e.to_string()).await?;
        }
        Err(_) => {
            tracing::warn!(job_id = %job.id, job_type = %job.job_type, "job exceeded timeout");
            queue::mark_timed_out(&pool, breakers, &job.id).await?;
        }
    }

    Ok(true)
}

/// Drains every named queue once, in order. Intended to be called on a
/// fixed interval by the consumer loop spawned at startup.
pub async fn drain_all_queues(state: &AppState) {
    for queue_name in QUEUES {
        loop {
            match run_one(state, queue_name).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    tracing::error!(queue = queue_name, %e, "queue drain failed");
                    break;
                }
            }
        }
    }
}
