//! # Integration Scenarios
//!
//! End-to-end filter behavior against the in-memory adapters.

pub mod caching;
pub mod properties;
pub mod rate_limiting;
pub mod resolution;
pub mod streaming;
pub mod telemetry;
