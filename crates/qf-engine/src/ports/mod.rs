//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - lifecycle API for callers
//! - Driven Ports (outbound) - query, input, cache, rate-limit, logging collaborators
//! - Strategy ports - one per optional pipeline behavior

pub mod inbound;
pub mod outbound;
pub mod strategy;

pub use inbound::FilterApi;
pub use outbound::{
    CacheStore, FilterLogger, InputSource, Principal, Producer, QueryBuilder, RateLimitStore,
    Remembered, CURSOR_PAGE_SIZE,
};
pub use strategy::{
    CachePolicy, PermissionPolicy, RateLimitRequest, RateLimitVerdict, RateLimiter, Rejection,
    ValueTransformer, Validator,
};
