//! Per-upstream three-state circuit breaker (closed / open / half-open)
//!
//! Grounded on the shape of `middleware::resilience::ResilienceConfig`
//! (failure threshold, recovery wait) but adds the actual state machine,
//! which the inherited config type only ever described.
//!
//! The local `DashMap` registry below is process-local and is what every
//! breaker falls back to when the KV substrate is unreachable. Spec §4.2
//! additionally requires breaker state to be shared across gateway
//! instances: `allow_kv`/`record_success_kv`/`record_failure_kv` run the
//! same state machine atomically inside a Redis Lua script (the same
//! pattern as `resilience::ratelimit::consume`'s token bucket), keyed
//! `circuit_breaker:<name>`, with a sibling heartbeat key so an operator can
//! tell a stale breaker from one nobody has called in a while.

use std::ops::DerefMut;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use deadpool_redis::Pool as KvPool;
use once_cell::sync::Lazy;
use redis::Script;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerEntry {
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at_secs: AtomicU64,
    state: std::sync::Mutex<BreakerState>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at_secs: AtomicU64::new(0),
            state: std::sync::Mutex::new(BreakerState::Closed),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn breaker_key(name: &str) -> String {
    format!("circuit_breaker:{name}")
}

fn heartbeat_key(name: &str) -> String {
    format!("circuit_breaker:{name}:heartbeat")
}

fn state_from_code(code: i64) -> BreakerState {
    match code {
        1 => BreakerState::Open,
        2 => BreakerState::HalfOpen,
        _ => BreakerState::Closed,
    }
}

/// Live snapshot of one breaker, for `/pool-metrics` (spec §4.2
/// "live-statistics exposure").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

// KEYS[1] = breaker hash key
// ARGV[1] = action ("check" | "success" | "failure")
// ARGV[2] = failure_threshold, ARGV[3] = success_threshold,
// ARGV[4] = recovery_timeout_secs, ARGV[5] = now, ARGV[6] = ttl_secs
//
// Returns {state (0=closed,1=open,2=half_open), allowed (0/1)}. Mirrors
// `BreakerRegistry`'s local state machine exactly so a gateway instance
// reading from Redis and one falling back to local state never disagree
// about the transition rules, only about which copy of the counters it saw.
static BREAKER_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local action = ARGV[1]
        local failure_threshold = tonumber(ARGV[2])
        local success_threshold = tonumber(ARGV[3])
        local recovery_timeout = tonumber(ARGV[4])
        local now = tonumber(ARGV[5])
        local ttl = tonumber(ARGV[6])

        local data = redis.call('HMGET', key, 'state', 'failures', 'successes', 'opened_at')
        local state = tonumber(data[1]) or 0
        local failures = tonumber(data[2]) or 0
        local successes = tonumber(data[3]) or 0
        local opened_at = tonumber(data[4]) or 0

        if action == 'check' then
            if state == 1 and (now - opened_at) >= recovery_timeout then
                state = 2
                successes = 0
            end
        elseif action == 'success' then
            failures = 0
            if state == 2 then
                successes = successes + 1
                if successes >= success_threshold then
                    state = 0
                    successes = 0
                end
            end
        elseif action == 'failure' then
            if state == 2 then
                state = 1
                opened_at = now
                failures = 0
            elseif state == 0 then
                failures = failures + 1
                if failures >= failure_threshold then
                    state = 1
                    opened_at = now
                end
            end
        end

        redis.call('HSET', key, 'state', state, 'failures', failures, 'successes', successes, 'opened_at', opened_at)
        redis.call('EXPIRE', key, ttl)

        local allowed = 1
        if state == 1 then allowed = 0 end

        return {state, allowed}
        "#,
    )
});

/// Registry of one breaker per key (typically a provider/model identifier).
pub struct BreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout_secs: u64,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, success_threshold: u32, recovery_timeout_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold,
            success_threshold,
            recovery_timeout_secs,
        }
    }

    /// Whether a call against `key` is currently permitted. Transitions
    /// `Open -> HalfOpen` once the recovery timeout has elapsed.
    pub fn allow(&self, key: &str) -> bool {
        let entry = self.entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        let mut state = entry.state.lock().unwrap();
        match *state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let opened_at = entry.opened_at_secs.load(Ordering::Relaxed);
                if now_secs().saturating_sub(opened_at) >= self.recovery_timeout_secs {
                    *state = BreakerState::HalfOpen;
                    entry.consecutive_successes.store(0, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let entry = self.entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        entry.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = entry.state.lock().unwrap();
        if *state == BreakerState::HalfOpen {
            let successes = entry.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= self.success_threshold {
                *state = BreakerState::Closed;
            }
        }
    }

    pub fn record_failure(&self, key: &str) {
        let entry = self.entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        let mut state = entry.state.lock().unwrap();
        match *state {
            BreakerState::HalfOpen => {
                *state = BreakerState::Open;
                entry.opened_at_secs.store(now_secs(), Ordering::Relaxed);
            }
            BreakerState::Closed => {
                let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.failure_threshold {
                    *state = BreakerState::Open;
                    entry.opened_at_secs.store(now_secs(), Ordering::Relaxed);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self, key: &str) -> BreakerState {
        self.entries
            .get(key)
            .map(|e| *e.state.lock().unwrap())
            .unwrap_or(BreakerState::Closed)
    }

    fn sync_local(&self, key: &str, state: BreakerState) {
        let entry = self.entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        *entry.state.lock().unwrap() = state;
    }

    async fn eval_kv(&self, pool: &KvPool, key: &str, action: &str, ttl_secs: u64) -> Result<(BreakerState, bool)> {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| crate::error::Error::Internal(format!("failed to get KV connection: {e}")))?;
        let now = now_secs();

        let (state, allowed): (i64, i64) = BREAKER_SCRIPT
            .key(breaker_key(key))
            .arg(action)
            .arg(self.failure_threshold)
            .arg(self.success_threshold)
            .arg(self.recovery_timeout_secs)
            .arg(now)
            .arg(ttl_secs)
            .invoke_async(conn.deref_mut())
            .await?;

        let _: std::result::Result<(), _> = redis::cmd("SET")
            .arg(heartbeat_key(key))
            .arg(now)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(conn.deref_mut())
            .await;

        Ok((state_from_code(state), allowed == 1))
    }

    /// Distributed `allow`: consults breaker state shared in the KV
    /// substrate under `circuit_breaker:<key>` (spec §4.2) so every gateway
    /// instance observes the same open/closed transitions, not just this
    /// process's local counters. Falls back to the local, in-process
    /// registry when `kv` is `None` or the substrate call fails.
    pub async fn allow_kv(&self, kv: Option<&KvPool>, key: &str, ttl_secs: u64) -> bool {
        let Some(pool) = kv else { return self.allow(key) };
        match self.eval_kv(pool, key, "check", ttl_secs).await {
            Ok((state, allowed)) => {
                self.sync_local(key, state);
                allowed
            }
            Err(e) => {
                tracing::warn!(%e, breaker = %key, "distributed breaker unavailable, falling back to local state");
                self.allow(key)
            }
        }
    }

    pub async fn record_success_kv(&self, kv: Option<&KvPool>, key: &str, ttl_secs: u64) {
        let Some(pool) = kv else { return self.record_success(key) };
        match self.eval_kv(pool, key, "success", ttl_secs).await {
            Ok((state, _)) => self.sync_local(key, state),
            Err(e) => {
                tracing::warn!(%e, breaker = %key, "distributed breaker unavailable, recording success locally");
                self.record_success(key);
            }
        }
    }

    pub async fn record_failure_kv(&self, kv: Option<&KvPool>, key: &str, ttl_secs: u64) {
        let Some(pool) = kv else { return self.record_failure(key) };
        match self.eval_kv(pool, key, "failure", ttl_secs).await {
            Ok((state, _)) => self.sync_local(key, state),
            Err(e) => {
                tracing::warn!(%e, breaker = %key, "distributed breaker unavailable, recording failure locally");
                self.record_failure(key);
            }
        }
    }

    /// Clears every breaker this process has observed, locally and (when
    /// reachable) in the KV substrate — a registry-wide reset (spec §4.2),
    /// e.g. for an operator clearing a stuck breaker after fixing an
    /// upstream outage.
    pub async fn reset_all(&self, kv: Option<&KvPool>) -> Result<()> {
        let names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for name in &names {
            self.entries.remove(name);
        }

        if let Some(pool) = kv {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| crate::error::Error::Internal(format!("failed to get KV connection: {e}")))?;
            for name in &names {
                let _: std::result::Result<(), _> = redis::cmd("DEL")
                    .arg(breaker_key(name))
                    .arg(heartbeat_key(name))
                    .query_async(conn.deref_mut())
                    .await;
            }
        }

        Ok(())
    }

    /// Snapshot of every breaker this process has observed, for
    /// `/pool-metrics` (spec §4.2 "live-statistics exposure").
    pub fn stats(&self) -> Vec<BreakerStats> {
        self.entries
            .iter()
            .map(|entry| BreakerStats {
                name: entry.key().clone(),
                state: *entry.state.lock().unwrap(),
                consecutive_failures: entry.consecutive_failures.load(Ordering::Relaxed),
                consecutive_successes: entry.consecutive_successes.load(Ordering::Relaxed),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let registry = BreakerRegistry::new(3, 1, 30);
        assert!(registry.allow("openrouter/gpt"));
        registry.record_failure("openrouter/gpt");
        registry.record_failure("openrouter/gpt");
        assert_eq!(registry.state("openrouter/gpt"), BreakerState::Closed);
        registry.record_failure("openrouter/gpt");
        assert_eq!(registry.state("openrouter/gpt"), BreakerState::Open);
        assert!(!registry.allow("openrouter/gpt"));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let registry = BreakerRegistry::new(1, 2, 0);
        registry.record_failure("key");
        assert_eq!(registry.state("key"), BreakerState::Open);
        assert!(registry.allow("key"));
        assert_eq!(registry.state("key"), BreakerState::HalfOpen);
        registry.record_success("key");
        assert_eq!(registry.state("key"), BreakerState::HalfOpen);
        registry.record_success("key");
        assert_eq!(registry.state("key"), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let registry = BreakerRegistry::new(1, 2, 0);
        registry.record_failure("key");
        registry.allow("key");
        registry.record_failure("key");
        assert_eq!(registry.state("key"), BreakerState::Open);
    }

    #[test]
    fn stats_reports_every_observed_breaker() {
        let registry = BreakerRegistry::new(3, 1, 30);
        registry.record_failure("a");
        registry.record_failure("b");
        registry.record_failure("b");
        let stats = registry.stats();
        assert_eq!(stats.len(), 2);
        let b = stats.iter().find(|s| s.name == "b").unwrap();
        assert_eq!(b.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn kv_helpers_fall_back_to_local_state_without_a_pool() {
        let registry = BreakerRegistry::new(1, 1, 30);
        assert!(registry.allow_kv(None, "kv-less", 300).await);
        registry.record_failure_kv(None, "kv-less", 300).await;
        assert_eq!(registry.state("kv-less"), BreakerState::Open);
    }

    #[tokio::test]
    async fn reset_all_clears_local_entries_without_a_pool() {
        let registry = BreakerRegistry::new(1, 1, 30);
        registry.record_failure("to-clear");
        assert_eq!(registry.state("to-clear"), BreakerState::Open);
        registry.reset_all(None).await.unwrap();
        assert_eq!(registry.state("to-clear"), BreakerState::Closed);
    }
}
