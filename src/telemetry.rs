//! Request counters, latency histograms, and breaker-state gauges (ambient
//! stack, SPEC_FULL §2 component #17).
//!
//! Grounded on the teacher's `middleware::metrics` module (`MetricsConfig`,
//! `metric_names`, `metric_labels`), adapted from a `tower-otel-http-metrics`
//! layer (not carried here, since nothing else in this crate talks to an
//! OTLP collector) into a concrete in-process registry built on the same
//! `dashmap` primitive the breaker registry already uses.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod metric_names {
    pub const HTTP_SERVER_REQUEST_COUNT: &str = "http.server.request.count";
    pub const HTTP_SERVER_REQUEST_DURATION: &str = "http.server.request.duration";
    pub const UPSTREAM_CALL_COUNT: &str = "upstream.call.count";
    pub const BREAKER_STATE: &str = "breaker.state";
}

/// Latency buckets in milliseconds, following the teacher's default bucket
/// boundaries.
pub const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

#[derive(Default)]
struct Histogram {
    buckets: Vec<AtomicU64>,
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: (0..LATENCY_BUCKETS_MS.len()).map(|_| AtomicU64::new(0)).collect(),
            sum_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration_ms: f64) {
        for (idx, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= *bound {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_ms.fetch_add(duration_ms as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_ms: u64,
}

/// Process-wide metric registry, held by `AppState` and read by the
/// `/health`/admin surfaces and the metrics middleware.
#[derive(Default)]
pub struct MetricsRegistry {
    request_counts: DashMap<(String, String, u16), AtomicU64>,
    request_latency: DashMap<(String, String), Histogram>,
    upstream_counts: DashMap<(String, String), AtomicU64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        self.request_counts
            .entry((method.to_string(), route.to_string(), status))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.request_latency
            .entry((method.to_string(), route.to_string()))
            .or_insert_with(Histogram::new)
            .observe(duration_ms);
    }

    pub fn record_upstream_call(&self, provider: &str, outcome: &str) {
        self.upstream_counts
            .entry((provider.to_string(), outcome.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.request_counts
            .get(&(method.to_string(), route.to_string(), status))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn latency_snapshot(&self, method: &str, route: &str) -> HistogramSnapshot {
        self.request_latency
            .get(&(method.to_string(), route.to_string()))
            .map(|h| HistogramSnapshot {
                count: h.count.load(Ordering::Relaxed),
                sum_ms: h.sum_ms.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reads_back_request_counts() {
        let registry = MetricsRegistry::new();
        registry.record_request("GET", "/v1/chat", 200, 12.0);
        registry.record_request("GET", "/v1/chat", 200, 48.0);
        assert_eq!(registry.request_count("GET", "/v1/chat", 200), 2);

        let snapshot = registry.latency_snapshot("GET", "/v1/chat");
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.sum_ms, 60);
    }

    #[test]
    fn distinct_status_codes_are_counted_separately() {
        let registry = MetricsRegistry::new();
        registry.record_request("POST", "/v1/chat", 200, 10.0);
        registry.record_request("POST", "/v1/chat", 429, 1.0);
        assert_eq!(registry.request_count("POST", "/v1/chat", 200), 1);
        assert_eq!(registry.request_count("POST", "/v1/chat", 429), 1);
    }
}
