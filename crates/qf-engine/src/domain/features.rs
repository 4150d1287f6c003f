//! Feature registry
//!
//! Optional pipeline behaviors are switched on and off per instance. The set is
//! seeded from configuration defaults when a filter is constructed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optional behaviors of the filter pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Validation,
    Permissions,
    RateLimit,
    Caching,
    Logging,
    Performance,
    Optimization,
    MemoryManagement,
    FilterChaining,
    ValueTransformation,
}

impl Feature {
    /// Every feature, in pipeline-independent declaration order
    pub const ALL: [Feature; 10] = [
        Feature::Validation,
        Feature::Permissions,
        Feature::RateLimit,
        Feature::Caching,
        Feature::Logging,
        Feature::Performance,
        Feature::Optimization,
        Feature::MemoryManagement,
        Feature::FilterChaining,
        Feature::ValueTransformation,
    ];

    /// Configuration name of the feature
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Validation => "validation",
            Feature::Permissions => "permissions",
            Feature::RateLimit => "rateLimit",
            Feature::Caching => "caching",
            Feature::Logging => "logging",
            Feature::Performance => "performance",
            Feature::Optimization => "optimization",
            Feature::MemoryManagement => "memoryManagement",
            Feature::FilterChaining => "filterChaining",
            Feature::ValueTransformation => "valueTransformation",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown feature name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feature: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    /// Accepts camelCase, snake_case and kebab-case spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Set of enabled features
///
/// `Copy`, so the pipeline can take a snapshot at entry and stay immune to
/// later toggles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FeatureSet {
    bits: u16,
}

impl FeatureSet {
    /// Empty set
    pub fn none() -> Self {
        Self::default()
    }

    /// Every feature enabled
    pub fn all() -> Self {
        Feature::ALL.iter().copied().collect()
    }

    /// Seed from a configuration map; unspecified features stay off
    pub fn from_defaults(defaults: &BTreeMap<Feature, bool>) -> Self {
        defaults
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(feature, _)| *feature)
            .collect()
    }

    pub fn enable(&mut self, feature: Feature) {
        self.bits |= feature.bit();
    }

    pub fn disable(&mut self, feature: Feature) {
        self.bits &= !feature.bit();
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        if enabled {
            self.enable(feature);
        } else {
            self.disable(feature);
        }
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.bits & feature.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Enabled features in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.iter().copied().filter(|f| self.contains(*f))
    }

    /// Enabled feature names, for debug output
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.as_str()).collect()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = FeatureSet::none();
        for feature in iter {
            set.enable(feature);
        }
        set
    }
}
