//! In-process sliding-window rate-limit store
//!
//! Every hit carries its own decay, so heavier requests keep the window
//! occupied for longer. Stale keys are swept by [`cleanup_task`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::ports::outbound::RateLimitStore;

/// One registered attempt
#[derive(Debug, Clone, Copy)]
struct Hit {
    at: Instant,
    decay: Duration,
}

impl Hit {
    /// Live while younger than its own decay or the checked window
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.at) < self.decay.max(window)
    }
}

/// Attempt windows keyed by throttle key
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<String, Vec<Hit>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired hits and empty windows; returns the number of keys removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|key, hits| {
            hits.retain(|hit| hit.is_live(now, Duration::ZERO));
            if hits.is_empty() {
                debug!(key = %key, "Removing stale rate limit window");
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn too_many_attempts(&self, key: &str, max_attempts: u32, window: Duration) -> bool {
        let now = Instant::now();
        let live = self
            .windows
            .get(key)
            .map(|hits| hits.iter().filter(|h| h.is_live(now, window)).count())
            .unwrap_or(0);
        live >= max_attempts as usize
    }

    fn hit(&self, key: &str, decay: Duration) -> u32 {
        let now = Instant::now();
        let mut hits = self.windows.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating new rate limit window");
            Vec::new()
        });
        hits.retain(|h| h.is_live(now, Duration::ZERO));
        hits.push(Hit { at: now, decay });
        hits.len() as u32
    }

    fn attempts(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.windows
            .get(key)
            .map(|hits| hits.iter().filter(|h| h.is_live(now, Duration::ZERO)).count() as u32)
            .unwrap_or(0)
    }

    fn clear(&self, key: &str) {
        self.windows.remove(key);
    }
}

/// Background task to sweep expired rate-limit windows
pub async fn cleanup_task(store: Arc<InMemoryRateLimitStore>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = store.cleanup();
        if removed > 0 {
            debug!(removed, "Swept rate limit windows");
        }
    }
}
