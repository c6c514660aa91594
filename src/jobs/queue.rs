//! Durable job records in the KV substrate with a work-stealing consumer
//! (spec §4.12). Queues are named lanes; each job is a hash keyed
//! `job:<id>` plus membership in a `queue:<name>` list for FIFO pop.

use chrono::Utc;
use deadpool_redis::Pool as KvPool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::kv::guarded_connection;
use crate::resilience::BreakerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    pub queue: String,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub timeout_secs: u64,
    pub enqueued_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error: Option<String>,
}

fn job_key(id: &str) -> String {
    format!("job:{id}")
}

fn queue_key(queue: &str) -> String {
    format!("queue:{queue}")
}

pub async fn enqueue(
    pool: &KvPool,
    breakers: &BreakerRegistry,
    job_type: &str,
    params: serde_json::Value,
    queue: &str,
    timeout_secs: u64,
) -> Result<String> {
    let id = Uuid::now_v7().to_string();
    let record = JobRecord {
        id: id.clone(),
        job_type: job_type.to_string(),
        queue: queue.to_string(),
        params,
        status: JobStatus::Queued,
        timeout_secs,
        enqueued_at: Utc::now().timestamp(),
        started_at: None,
        finished_at: None,
        error: None,
    };

    let mut conn = guarded_connection(pool, breakers).await?;
    let payload = serde_json::to_string(&record)
        .map_err(|e| Error::Internal(format!("failed to serialize job record: {e}")))?;

    let _: () = conn.set(job_key(&id), &payload).await?;
    let _: () = conn.rpush(queue_key(queue), &id).await?;

    Ok(id)
}

/// Pops the oldest job from `queue`, marking it `Running`. Multiple
/// consumers calling this concurrently each get a distinct job (Redis
/// `LPOP` is atomic), giving work-stealing semantics across workers.
pub async fn claim_next(pool: &KvPool, breakers: &BreakerRegistry, queue: &str) -> Result<Option<JobRecord>> {
    let mut conn = guarded_connection(pool, breakers).await?;
    let id: Option<String> = conn.lpop(queue_key(queue), None).await?;
    let Some(id) = id else { return Ok(None) };

    let Some(mut record) = fetch(pool, breakers, &id).await? else { return Ok(None) };
    record.status = JobStatus::Running;
    record.started_at = Some(Utc::now().timestamp());
    persist(pool, breakers, &record).await?;
    Ok(Some(record))
}

pub async fn fetch(pool: &KvPool, breakers: &BreakerRegistry, id: &str) -> Result<Option<JobRecord>> {
    let mut conn = guarded_connection(pool, breakers).await?;
    let payload: Option<String> = conn.get(job_key(id)).await?;
    match payload {
        None => Ok(None),
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| crate::error::Error::Internal(format!("corrupt job record: {e}"))),
    }
}

async fn persist(pool: &KvPool, breakers: &BreakerRegistry, record: &JobRecord) -> Result<()> {
    let mut conn = guarded_connection(pool, breakers).await?;
    let payload = serde_json::to_string(record)
        .map_err(|e| crate::error::Error::Internal(format!("failed to serialize job record: {e}")))?;
    let _: () = conn.set(job_key(&record.id), payload).await?;
    Ok(())
}

pub async fn mark_succeeded(pool: &KvPool, breakers: &BreakerRegistry, id: &str) -> Result<()> {
    if let Some(mut record) = fetch(pool, breakers, id).await? {
        record.status = JobStatus::Succeeded;
        record.finished_at = Some(Utc::now().timestamp());
        persist(pool, breakers, &record).await?;
    }
    Ok(())
}

pub async fn mark_failed(pool: &KvPool, breakers: &BreakerRegistry, id: &str, error: &str) -> Result<()> {
    if let Some(mut record) = fetch(pool, breakers, id).await? {
        record.status = JobStatus::Failed;
        record.finished_at = Some(Utc::now().timestamp());
        record.error = Some(error.to_string());
        persist(pool, breakers, &record).await?;
    }
    Ok(())
}

/// Kills a job that has exceeded its deadline (spec §5 "Cancellation &
/// timeouts"). Called by the consumer loop's timeout guard, not by the job
/// itself.
pub async fn mark_timed_out(pool: &KvPool, breakers: &BreakerRegistry, id: &str) -> Result<()> {
    if let Some(mut record) = fetch(pool, breakers, id).await? {
        record.status = JobStatus::TimedOut;
        record.finished_at = Some(Utc::now().timestamp());
        record.error = Some("job exceeded its timeout".to_string());
        persist(pool, breakers, &record).await?;
    }
    Ok(())
}

pub async fn cancel(pool: &KvPool, breakers: &BreakerRegistry, id: &str) -> Result<bool> {
    let Some(mut record) = fetch(pool, breakers, id).await? else { return Ok(false) };
    if matches!(record.status, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled) {
        return Ok(false);
    }
    record.status = JobStatus::Cancelled;
    record.finished_at = Some(Utc::now().timestamp());
    persist(pool, breakers, &record).await?;
    Ok(true)
}

/// Drains all queued-but-unclaimed jobs from a queue. In-flight (running)
/// jobs are left untouched.
pub async fn clear(pool: &KvPool, breakers: &BreakerRegistry, queue: &str) -> Result<u64> {
    let mut conn = guarded_connection(pool, breakers).await?;
    let mut cleared = 0u64;
    loop {
        let id: Option<String> = conn.lpop(queue_key(queue), None).await?;
        match id {
            Some(id) => {
                cancel(pool, breakers, &id).await?;
                cleared += 1;
            }
            None => break,
        }
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_namespaces_by_id() {
        assert_eq!(job_key("abc"), "job:abc");
    }

    #[test]
    fn queue_key_namespaces_by_name() {
        assert_eq!(queue_key("embeddings"), "queue:embeddings");
    }
}
