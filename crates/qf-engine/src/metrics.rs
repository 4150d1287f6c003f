//! Metrics hooks for filter operations
//!
//! Recorded only while the `performance` feature is enabled on an instance.
//!
//! ## Usage
//!
//! ```ignore
//! use qf_engine::metrics::FilterMetrics;
//!
//! let metrics = Arc::new(FilterMetrics::new());
//! let filter = Filter::builder(definition).metrics(metrics.clone()).build();
//! // ... apply / get ...
//! println!("{:?}", metrics.snapshot());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Thread-safe counters shared across filter instances
#[derive(Default)]
pub struct FilterMetrics {
    /// Completed apply calls (applied or failed)
    pub applies: AtomicU64,
    /// Apply calls that ended in `failed`
    pub failures: AtomicU64,
    /// Individual predicate dispatches
    pub dispatches: AtomicU64,
    /// Read-through calls served from cache
    pub cache_hits: AtomicU64,
    /// Read-through calls that ran the query
    pub cache_misses: AtomicU64,
    /// Executions that skipped the cache
    pub direct_executions: AtomicU64,
    /// Rate-limit checks that returned false
    pub rate_limit_rejections: AtomicU64,
    /// Cumulative apply time in nanoseconds
    pub apply_time_ns: AtomicU64,
}

impl FilterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished apply
    pub fn record_apply(&self, duration: Duration, failed: bool) {
        self.applies.fetch_add(1, Ordering::Relaxed);
        self.apply_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read-through lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_direct_execution(&self) {
        self.direct_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_apply_time_ns(&self) -> u64 {
        let total = self.apply_time_ns.load(Ordering::Relaxed);
        let count = self.applies.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Share of read-through lookups served from cache
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            applies: self.applies.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            direct_executions: self.direct_executions.load(Ordering::Relaxed),
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
            avg_apply_ns: self.avg_apply_time_ns(),
        }
    }

    pub fn reset(&self) {
        self.applies.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.dispatches.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.direct_executions.store(0, Ordering::Relaxed);
        self.rate_limit_rejections.store(0, Ordering::Relaxed);
        self.apply_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub applies: u64,
    pub failures: u64,
    pub dispatches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub direct_executions: u64,
    pub rate_limit_rejections: u64,
    pub avg_apply_ns: u64,
}

/// Sink for filter metrics
///
/// Implement this to forward measurements to an external system.
pub trait MetricsRecorder: Send + Sync {
    fn record_apply(&self, duration: Duration, failed: bool);

    fn record_dispatch(&self);

    fn record_cache_lookup(&self, hit: bool);

    fn record_direct_execution(&self);

    fn record_rate_limit_rejection(&self);
}

/// No-op recorder used when no metrics sink is configured
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_apply(&self, _: Duration, _: bool) {}
    fn record_dispatch(&self) {}
    fn record_cache_lookup(&self, _: bool) {}
    fn record_direct_execution(&self) {}
    fn record_rate_limit_rejection(&self) {}
}

impl MetricsRecorder for FilterMetrics {
    fn record_apply(&self, duration: Duration, failed: bool) {
        FilterMetrics::record_apply(self, duration, failed);
    }

    fn record_dispatch(&self) {
        FilterMetrics::record_dispatch(self);
    }

    fn record_cache_lookup(&self, hit: bool) {
        FilterMetrics::record_cache_lookup(self, hit);
    }

    fn record_direct_execution(&self) {
        FilterMetrics::record_direct_execution(self);
    }

    fn record_rate_limit_rejection(&self) {
        FilterMetrics::record_rate_limit_rejection(self);
    }
}
