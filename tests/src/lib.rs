//! # Query-Filter Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Shared datasets, definitions and test doubles
//! └── integration/      # End-to-end filter scenarios
//!     ├── lifecycle.rs
//!     ├── resolution.rs
//!     ├── caching.rs
//!     ├── housekeeping.rs   # cleanup/eviction tasks under tokio
//!     ├── rate_limiting.rs
//!     ├── streaming.rs
//!     ├── telemetry.rs      # TracingLogger through a tracing subscriber
//!     └── properties.rs # proptest invariants
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qf-tests
//!
//! # By category
//! cargo test -p qf-tests integration::caching::
//!
//! # Benchmarks
//! cargo bench -p qf-tests
//! ```

#![allow(dead_code)]

pub mod integration;
