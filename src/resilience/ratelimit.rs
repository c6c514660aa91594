//! Redis-backed token-bucket rate limiter (spec §4.1).
//!
//! Grounded on `middleware::rate_limit::RateLimit::check_rate_limit`'s
//! INCR/EXPIRE shape for the Redis round-trip pattern, but the actual bucket
//! semantics follow `examples/original_source/server/app/core/ratelimit.py`:
//! state is a Redis hash `{tokens, last_refill}` refilled by elapsed-time
//! proportion inside one atomic Lua script, TTL'd at `2*window_seconds`.

use std::ops::DerefMut;

use deadpool_redis::Pool as KvPool;
use once_cell::sync::Lazy;
use redis::Script;

use crate::error::Result;
use crate::kv::guarded_connection;
use crate::resilience::BreakerRegistry;

/// Outcome of a single `consume` call.
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub retry_after_secs: u64,
}

// KEYS[1] = bucket key
// ARGV[1] = capacity, ARGV[2] = refill_rate (tokens/sec), ARGV[3] = cost,
// ARGV[4] = now (unix seconds), ARGV[5] = ttl_secs
//
// Returns {allowed (0/1), remaining_tokens}.
static CONSUME_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local capacity = tonumber(ARGV[1])
        local refill_rate = tonumber(ARGV[2])
        local cost = tonumber(ARGV[3])
        local now = tonumber(ARGV[4])
        local ttl = tonumber(ARGV[5])

        local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
        local tokens = tonumber(bucket[1])
        local last_refill = tonumber(bucket[2])

        if tokens == nil then
            tokens = capacity
            last_refill = now
        end

        local elapsed = math.max(0, now - last_refill)
        tokens = math.min(capacity, tokens + elapsed * refill_rate)

        local allowed = 0
        if tokens >= cost then
            tokens = tokens - cost
            allowed = 1
        end

        redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
        redis.call('EXPIRE', key, ttl)

        return {allowed, math.floor(tokens)}
        "#,
    )
});

/// Atomically refill-and-consume `cost` tokens from the bucket named `key`.
///
/// `capacity` is the bucket size, `window_secs` is the period over which the
/// bucket fully refills (refill_rate = capacity / window_secs).
pub async fn consume(
    pool: &KvPool,
    breakers: &BreakerRegistry,
    key: &str,
    capacity: u64,
    window_secs: u64,
    cost: u64,
) -> Result<Decision> {
    if capacity == 0 {
        return Ok(Decision {
            allowed: false,
            remaining: 0,
            retry_after_secs: window_secs.max(1),
        });
    }

    let mut conn = guarded_connection(pool, breakers).await?;

    let refill_rate = capacity as f64 / window_secs.max(1) as f64;
    let now = unix_now_secs();
    let ttl = window_secs.saturating_mul(2).max(1);

    let (allowed, remaining): (i64, i64) = CONSUME_SCRIPT
        .key(key)
        .arg(capacity)
        .arg(refill_rate)
        .arg(cost)
        .arg(now)
        .arg(ttl)
        .invoke_async(conn.deref_mut())
        .await?;

    Ok(Decision {
        allowed: allowed == 1,
        remaining: remaining.max(0) as u64,
        retry_after_secs: if allowed == 1 { 0 } else { window_secs.max(1) },
    })
}

/// Legacy fixed-window counter, kept for callers that want a plain
/// "N requests per window" limit without bucket refill semantics (daily
/// quota pre-checks read the usage ledger directly instead; see
/// `usage::check_daily_quota`).
pub async fn check_fixed_window(
    pool: &KvPool,
    breakers: &BreakerRegistry,
    key: &str,
    limit: u64,
    window_secs: u64,
) -> Result<Decision> {
    let mut conn = guarded_connection(pool, breakers).await?;

    let count: u64 = redis::cmd("INCR")
        .arg(key)
        .query_async(conn.deref_mut())
        .await?;

    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs as i64)
            .query_async(conn.deref_mut())
            .await?;
    }

    let ttl: i64 = redis::cmd("TTL")
        .arg(key)
        .query_async(conn.deref_mut())
        .await
        .unwrap_or(window_secs as i64);

    Ok(Decision {
        allowed: count <= limit,
        remaining: limit.saturating_sub(count),
        retry_after_secs: ttl.max(1) as u64,
    })
}

/// Decrement a previously-consumed daily token quota back by `amount`
/// (used when a chat completion call fails after quota was reserved).
pub async fn refund(pool: &KvPool, breakers: &BreakerRegistry, key: &str, amount: i64) -> Result<()> {
    let mut conn = guarded_connection(pool, breakers).await?;

    let _: i64 = redis::cmd("DECRBY")
        .arg(key)
        .arg(amount)
        .query_async(conn.deref_mut())
        .await?;

    Ok(())
}

fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
