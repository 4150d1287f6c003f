//! # Tag-Aware LRU Result Cache
//!
//! In-process [`CacheStore`] with per-entry TTL and tag-based invalidation.
//!
//! ## Why tags
//!
//! Filtered result keys are high-cardinality (one per filter combination per
//! principal), so invalidating "everything for the users table" by enumerating
//! keys is infeasible. Each entry is indexed under its tags instead and
//! `flush_tags` drops the whole group.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::FilterError;
use crate::ports::outbound::{CacheStore, Producer, Remembered};

struct Entry {
    value: Bytes,
    expires_at: Instant,
    tags: Vec<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    /// tag → keys carrying it
    tag_index: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.unindex(key, &entry.tags);
        Some(entry)
    }

    fn unindex(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }
}

/// Bounded in-memory cache store
pub struct InMemoryCacheStore {
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    remember_calls: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                tag_index: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remember_calls: AtomicU64::new(0),
        }
    }

    /// Drop expired entries; returns how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.tag_index.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            tags: inner.tag_index.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remember_calls: self.remember_calls.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: &str, value: Bytes, ttl: Duration, tags: &[String]) {
        let mut inner = self.inner.lock();
        inner.remove(key);

        for tag in tags {
            inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
            tags: tags.to_vec(),
        };
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), entry) {
            // push returns the displaced LRU entry when at capacity
            if evicted_key != key {
                debug!(key = %evicted_key, "Evicted least recently used cache entry");
                inner.unindex(&evicted_key, &evicted.tags);
            }
        }
    }

    fn forget(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    fn supports_tags(&self) -> bool {
        true
    }

    fn flush_tags(&self, tags: &[String]) -> usize {
        let mut inner = self.inner.lock();
        let keys: HashSet<String> = tags
            .iter()
            .filter_map(|tag| inner.tag_index.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect();
        let mut removed = 0;
        for key in &keys {
            if inner.remove(key).is_some() {
                removed += 1;
            }
        }
        debug!(tags = ?tags, removed, "Flushed tagged cache entries");
        removed
    }

    fn remember(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        producer: &mut Producer<'_>,
    ) -> Result<Remembered, FilterError> {
        self.remember_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(value) = self.get(key) {
            return Ok(Remembered {
                value,
                from_cache: true,
            });
        }
        let value = producer()?;
        self.put(key, value.clone(), ttl, tags);
        Ok(Remembered {
            value,
            from_cache: false,
        })
    }
}

/// Cache statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub tags: usize,
    pub hits: u64,
    pub misses: u64,
    /// Read-through calls, whether or not they hit
    pub remember_calls: u64,
}

/// Background task to evict expired cache entries
pub async fn eviction_task(store: Arc<InMemoryCacheStore>, interval: Duration) {
    let mut eviction_interval = tokio::time::interval(interval);
    eviction_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        eviction_interval.tick().await;
        let removed = store.evict_expired();
        if removed > 0 {
            debug!(removed, "Evicted expired cache entries");
        }
    }
}
