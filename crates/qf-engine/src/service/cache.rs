//! Result caching strategy
//!
//! Sits between the orchestrator and a [`CacheStore`]: decides whether a
//! query goes through the read-through path and (de)serializes rows.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::cache_key::CacheKey;
use crate::domain::query::QueryShape;
use crate::error::{FilterError, FilterResult};
use crate::ports::outbound::CacheStore;
use crate::ports::strategy::CachePolicy;

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from the store
    Hit,
    /// Computed and stored
    Miss,
    /// Executed without touching the store
    Direct,
}

/// Caching decisions and serialization for one filter instance
pub struct CacheStrategy {
    store: Arc<dyn CacheStore>,
    policy: Arc<dyn CachePolicy>,
}

impl CacheStrategy {
    pub fn new(store: Arc<dyn CacheStore>, policy: Arc<dyn CachePolicy>) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Whether the read-through path applies
    ///
    /// An explicit `force` wins; otherwise the policy decides when smart
    /// caching is on, and everything is cached when it is off.
    pub fn should_cache(&self, shape: &QueryShape, force: Option<bool>, smart: bool) -> bool {
        match force {
            Some(forced) => forced,
            None if smart => self.policy.should_cache(shape),
            None => true,
        }
    }

    /// Read-through fetch of serializable values
    pub fn remember<T, F>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        tags: &[String],
        compute: F,
    ) -> FilterResult<(T, CacheOutcome)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> FilterResult<T>,
    {
        let mut compute = Some(compute);
        let mut computed: Option<T> = None;

        let remembered = {
            let mut producer = || -> Result<Bytes, FilterError> {
                let compute = compute
                    .take()
                    .ok_or_else(|| FilterError::Cache("producer invoked twice".into()))?;
                let value = compute()?;
                let bytes = Bytes::from(serde_json::to_vec(&value)?);
                computed = Some(value);
                Ok(bytes)
            };
            self.store
                .remember(key.as_str(), ttl, tags, &mut producer)?
        };

        if remembered.from_cache {
            let value: T = serde_json::from_slice(&remembered.value)?;
            return Ok((value, CacheOutcome::Hit));
        }
        match computed {
            Some(value) => Ok((value, CacheOutcome::Miss)),
            // Store produced a value without calling us; trust its bytes
            None => Ok((serde_json::from_slice(&remembered.value)?, CacheOutcome::Hit)),
        }
    }

    /// Forget the result and count entries for `key`
    pub fn forget(&self, key: &CacheKey) -> bool {
        let results = self.store.forget(key.as_str());
        let count = self.store.forget(key.count_key().as_str());
        results || count
    }

    /// Flush by tag when the store supports it; returns entries removed
    pub fn flush_tags(&self, tags: &[String]) -> Option<usize> {
        if tags.is_empty() || !self.store.supports_tags() {
            return None;
        }
        Some(self.store.flush_tags(tags))
    }
}
