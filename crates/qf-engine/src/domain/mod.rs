//! Domain layer: pure filter logic with no I/O

pub mod cache_key;
pub mod complexity;
pub mod config;
pub mod definition;
pub mod features;
pub mod query;
pub mod resolver;
pub mod state;
pub mod transform;
pub mod validation;
pub mod value;

pub use cache_key::{CacheKey, CacheKeyBuilder, SmartCachePolicy, GLOBAL_SCOPE, PRINCIPAL_PREFIX};
pub use complexity::ComplexityScorer;
pub use config::{CacheConfig, ConfigError, FilterDefaults, RateLimitConfig, StreamingConfig};
pub use definition::{FilterDefinition, FilterDefinitionBuilder, PreFilterFn, PredicateFn};
pub use features::{Feature, FeatureSet, UnknownFeature};
pub use query::{Direction, Operator, PredicateKind, QueryShape};
pub use state::FilterState;
pub use transform::Transform;
pub use validation::{Rule, ValidationErrors};
pub use value::{is_absent, FilterValue, Filterables, Options};
