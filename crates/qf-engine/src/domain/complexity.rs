//! Complexity scoring for in-flight filter requests
//!
//! `score = Σ weight(key) × (len(value) if collection else 1)`

use std::collections::HashMap;

use super::value::{collection_len, Filterables};

/// Weight applied to keys without an explicit entry
pub const DEFAULT_WEIGHT: u32 = 1;

/// Weighted cost estimator
#[derive(Debug, Clone, Default)]
pub struct ComplexityScorer {
    weights: HashMap<String, u32>,
}

impl ComplexityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scorer with an explicit weight map
    pub fn with_weights(weights: HashMap<String, u32>) -> Self {
        Self { weights }
    }

    /// Layer `overrides` on top of the current weights
    pub fn overridden_by(mut self, overrides: &HashMap<String, u32>) -> Self {
        for (key, weight) in overrides {
            self.weights.insert(key.clone(), *weight);
        }
        self
    }

    pub fn weight(&self, key: &str) -> u32 {
        self.weights.get(key).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// Score a set of active filterables
    ///
    /// An empty collection still counts as one unit; absent values never reach
    /// the scorer because the resolver drops them.
    pub fn score(&self, filterables: &Filterables) -> u32 {
        filterables
            .iter()
            .map(|(key, value)| {
                let multiplier = collection_len(value).unwrap_or(1).max(1) as u32;
                self.weight(key).saturating_mul(multiplier)
            })
            .fold(0u32, u32::saturating_add)
    }
}
