//! Adapters Layer
//!
//! In-process implementations of the outbound ports.

pub mod memory_cache;
pub mod memory_query;
pub mod memory_rate_limit;
pub mod principal;
pub mod request_params;
pub mod tracing_logger;

pub use memory_cache::{eviction_task, CacheStats, InMemoryCacheStore};
pub use memory_query::InMemoryQuery;
pub use memory_rate_limit::{cleanup_task, InMemoryRateLimitStore};
pub use principal::Actor;
pub use request_params::RequestParams;
pub use tracing_logger::TracingLogger;
