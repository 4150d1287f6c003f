//! Query Filter Engine - turns loosely-typed request parameters into predicate
//! applications against a query builder.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           FILTER INSTANCE                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  InputSource ──→ Resolver ──→ Permissions ──→ Validation             │
//! │                                                   │                  │
//! │                         RateLimiter (advisory) ←──┘                  │
//! │                                │                                     │
//! │          Transforms ──→ Predicate dispatch ──→ Chaining ──→ Hints    │
//! │                                │                                     │
//! │  ┌─────────────────────────────┴──────────────────────────────┐      │
//! │  │   get(): streaming  |  read-through cache  |  direct        │      │
//! │  └─────────────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────────────┘
//!        │                      │                        │
//!   QueryBuilder           CacheStore             RateLimitStore
//! ```
//!
//! # Lifecycle
//!
//! `initialized → applying → applied | failed`. `apply` is only valid from
//! `initialized`; `reset` is the only way back.
//!
//! # Usage
//!
//! ```ignore
//! use qf_engine::{Filter, FilterDefinition, InMemoryQuery, RequestParams};
//!
//! let definition = FilterDefinition::builder("users")
//!     .filter("status", |q: &mut InMemoryQuery, v| Ok(q.where_eq("status", v)?))
//!     .build();
//!
//! let mut filter = Filter::builder(definition)
//!     .input(RequestParams::from_query_string("status=active"))
//!     .build();
//! filter.apply(query, Options::new())?;
//! let rows = filter.get()?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{
    cleanup_task, eviction_task, Actor, CacheStats, InMemoryCacheStore, InMemoryQuery,
    InMemoryRateLimitStore, RequestParams, TracingLogger,
};
pub use domain::{
    CacheConfig, CacheKey, CacheKeyBuilder, ComplexityScorer, Direction, Feature, FeatureSet,
    FilterDefaults, FilterDefinition, FilterState, FilterValue, Filterables, Operator, Options,
    QueryShape, RateLimitConfig, Rule, SmartCachePolicy, StreamingConfig, Transform,
    ValidationErrors,
};
pub use error::{FilterError, FilterResult, QueryError};
pub use metrics::{FilterMetrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{
    CacheStore, FilterApi, FilterLogger, InputSource, Principal, QueryBuilder, RateLimitStore,
    RateLimitVerdict, RateLimiter, Rejection,
};
pub use service::{
    ComplexityRateLimiter, DebugInfo, Filter, FilterBuilder, LazyRows, PerformanceReport,
};
