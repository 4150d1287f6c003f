//! Service layer: the orchestrator and the collaborators it composes

pub mod cache;
pub mod filter;
pub mod rate_limiter;
pub mod strategies;
pub mod streaming;

pub use cache::{CacheOutcome, CacheStrategy};
pub use filter::{
    ChainedPredicate, DebugInfo, Filter, FilterBuilder, PerformanceReport, SharedInput,
    ANONYMOUS_CALLER,
};
pub use rate_limiter::ComplexityRateLimiter;
pub use strategies::{AlwaysCache, DeclaredPermissions, DeclaredTransforms, RuleValidator};
pub use streaming::{collect_chunked, LazyIter, LazyRows, MIN_CHUNK_SIZE};
