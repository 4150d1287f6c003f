//! Cache key derivation and the smart-caching heuristic
//!
//! Keys have the form `prefix:scope:hash` where `hash` is the hex SHA-256
//! of the URL-encoded, key-sorted filterables. `scope` is [`GLOBAL_SCOPE`] or
//! the URL-encoded principal identifier behind [`PRINCIPAL_PREFIX`], so no
//! identifier can collide with the sentinel or add a segment. Sorting happens before hashing
//! so insertion order never changes the key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::query::QueryShape;
use super::value::{canonical_encode, is_absent, scalar_string, stable_encode, FilterValue, Filterables};

/// Principal segment used when no principal is acting
pub const GLOBAL_SCOPE: &str = "global";

/// Marks a principal scope segment
pub const PRINCIPAL_PREFIX: &str = "p-";

/// Suffix appended to result keys for cached counts
pub const COUNT_SUFFIX: &str = ":count";

/// A derived cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for the count-only cache path
    pub fn count_key(&self) -> CacheKey {
        CacheKey(format!("{}{}", self.0, COUNT_SUFFIX))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic cache key builder for one filter type
#[derive(Clone, Debug)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the key for `filterables` scoped to `principal`
    pub fn build(&self, filterables: &Filterables, principal: Option<&FilterValue>) -> CacheKey {
        let scope = principal
            .filter(|p| !is_absent(p))
            .map(principal_segment)
            .unwrap_or_else(|| GLOBAL_SCOPE.to_string());

        CacheKey(format!(
            "{}:{}:{}",
            self.prefix,
            scope,
            digest_filterables(filterables)
        ))
    }
}

fn principal_segment(principal: &FilterValue) -> String {
    let id = match scalar_string(principal) {
        Some(id) => form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>(),
        None => sha256_hex(stable_encode(principal).as_bytes()),
    };
    format!("{}{}", PRINCIPAL_PREFIX, id)
}

/// Hash of the sanitized, sorted and URL-encoded filterables
pub fn digest_filterables(filterables: &Filterables) -> String {
    // BTreeMap iteration is already sorted by key
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in filterables.iter().filter(|(_, v)| !is_absent(v)) {
        serializer.append_pair(key, &encode_value(value));
    }
    sha256_hex(serializer.finish().as_bytes())
}

fn encode_value(value: &FilterValue) -> String {
    match value {
        FilterValue::Array(_) | FilterValue::Object(_) => {
            sha256_hex(canonical_encode(value).as_bytes())
        }
        other => scalar_string(other).unwrap_or_else(|| sha256_hex(stable_encode(other).as_bytes())),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Decides whether a finalized query is worth caching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmartCachePolicy {
    /// Queries with at most this many simple predicates are executed directly
    pub max_cheap_predicates: usize,
}

impl Default for SmartCachePolicy {
    fn default() -> Self {
        Self {
            max_cheap_predicates: 1,
        }
    }
}

impl SmartCachePolicy {
    /// Too cheap: no join, and at most one predicate which is a plain comparison
    pub fn is_too_cheap(&self, shape: &QueryShape) -> bool {
        !shape.has_join()
            && shape.predicate_count() <= self.max_cheap_predicates
            && shape.predicates.iter().all(|p| p.is_simple_comparison())
    }

    pub fn should_cache(&self, shape: &QueryShape) -> bool {
        !self.is_too_cheap(shape)
    }
}
