//! Filter defaults with validation.
//!
//! Read once when a filter instance is constructed. The process-wide snapshot
//! returned by [`FilterDefaults::shared`] is built from the environment on
//! first use and never mutated afterwards; tests and embedders that need other
//! values inject their own `Arc<FilterDefaults>`.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::features::{Feature, FeatureSet};
use super::value::Options;

lazy_static::lazy_static! {
    static ref SHARED_DEFAULTS: Arc<FilterDefaults> = Arc::new(FilterDefaults::from_env());
}

/// Process-wide defaults for new filter instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    /// Feature flags applied to every new instance
    pub features: BTreeMap<Feature, bool>,
    /// Default runtime options merged under per-call options
    pub options: Options,
    /// Result caching configuration
    pub cache: CacheConfig,
    /// Complexity gates and throttle configuration
    pub rate_limit: RateLimitConfig,
    /// Memory-bounded execution configuration
    pub streaming: StreamingConfig,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            features: Feature::ALL.iter().map(|f| (*f, false)).collect(),
            options: Options::new(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl FilterDefaults {
    /// Shared immutable snapshot
    pub fn shared() -> Arc<FilterDefaults> {
        Arc::clone(&SHARED_DEFAULTS)
    }

    /// Feature set seeded from these defaults
    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet::from_defaults(&self.features)
    }

    /// Builder-style feature default
    pub fn with_feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.features.insert(feature, enabled);
        self
    }

    /// Parse from JSON, then validate
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let defaults: FilterDefaults =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Build defaults from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QF_FEATURES`: comma-separated features to enable (e.g. `caching,logging`)
    /// - `QF_DISABLED_FEATURES`: comma-separated features to force off
    /// - `QF_CACHE_TTL`: default cache TTL (`60m`, `300s`, ...)
    /// - `QF_CACHE_COUNT_TTL`: TTL for cached counts
    /// - `QF_MAX_FILTERS`: count gate maximum
    /// - `QF_MAX_COMPLEXITY`: complexity gate maximum
    /// - `QF_MAX_ATTEMPTS`: throttle attempts per window
    /// - `QF_RATE_WINDOW`: throttle window (`60s`, ...)
    /// - `QF_CHUNK_SIZE`: default streaming chunk size
    ///
    /// Unparseable values are ignored and the built-in default is kept.
    pub fn from_env() -> Self {
        let mut defaults = Self::default();

        if let Ok(list) = env::var("QF_FEATURES") {
            for feature in parse_feature_list(&list) {
                defaults.features.insert(feature, true);
            }
        }
        if let Ok(list) = env::var("QF_DISABLED_FEATURES") {
            for feature in parse_feature_list(&list) {
                defaults.features.insert(feature, false);
            }
        }
        if let Some(ttl) = env_duration("QF_CACHE_TTL") {
            defaults.cache.ttl = ttl;
        }
        if let Some(ttl) = env_duration("QF_CACHE_COUNT_TTL") {
            defaults.cache.count_ttl = ttl;
        }
        if let Some(max) = env_parse("QF_MAX_FILTERS") {
            defaults.rate_limit.max_filters = max;
        }
        if let Some(max) = env_parse("QF_MAX_COMPLEXITY") {
            defaults.rate_limit.max_complexity = max;
        }
        if let Some(max) = env_parse("QF_MAX_ATTEMPTS") {
            defaults.rate_limit.max_attempts = max;
        }
        if let Some(window) = env_duration("QF_RATE_WINDOW") {
            defaults.rate_limit.window = window;
        }
        if let Some(size) = env_parse("QF_CHUNK_SIZE") {
            defaults.streaming.chunk_size = size;
        }

        if defaults.validate().is_err() {
            return Self::default();
        }
        defaults
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::InvalidCache("capacity cannot be 0".into()));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_attempts cannot be 0".into(),
            ));
        }
        if self.rate_limit.decay_divisor == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "decay_divisor cannot be 0".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
        }
        if self.streaming.chunk_size == 0 {
            return Err(ConfigError::InvalidStreaming(
                "chunk_size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Result caching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached result collections
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// TTL for cached counts
    #[serde(with = "humantime_serde")]
    pub count_ttl: Duration,
    /// Cache counts alongside results
    pub cache_count: bool,
    /// Skip caching for queries the heuristic deems too cheap
    pub smart: bool,
    /// Entry capacity of the in-memory store
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            count_ttl: Duration::from_secs(10 * 60),
            cache_count: false,
            smart: true,
            capacity: 10_000,
        }
    }
}

/// Complexity gates and throttle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Count gate: maximum active filterables per request
    pub max_filters: usize,
    /// Complexity gate: maximum weighted score per request
    pub max_complexity: u32,
    /// Throttle gate: attempts allowed per window
    pub max_attempts: u32,
    /// Throttle window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Decay multiplier is `max(1, ceil(score / decay_divisor))`
    pub decay_divisor: u32,
    /// Include the acting principal in the throttle key
    pub per_principal: bool,
    /// Per-key complexity weights; override definition weights
    pub weights: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_filters: 10,
            max_complexity: 100,
            max_attempts: 60,
            window: Duration::from_secs(60),
            decay_divisor: 10,
            per_principal: false,
            weights: HashMap::new(),
        }
    }
}

/// Memory-bounded execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Rows fetched per chunk (minimum 1)
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid caching configuration
    #[error("invalid cache config: {0}")]
    InvalidCache(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid streaming configuration
    #[error("invalid streaming config: {0}")]
    InvalidStreaming(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_feature_list(list: &str) -> Vec<Feature> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.parse::<Feature>().ok())
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_duration(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| humantime_serde::parse_duration(&v).ok())
}

/// Humantime serde module for Duration serialization
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        if millis % 1000 != 0 {
            serializer.serialize_str(&format!("{}ms", millis))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(|_| "invalid hours")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
