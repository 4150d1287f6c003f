//! # Query-Filter Telemetry
//!
//! Installs a `tracing` subscriber for processes embedding the filter engine.
//! The engine itself only emits events through its `TracingLogger` adapter;
//! this crate decides where they go.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qf_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QF_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `QF_JSON_LOGS` | `false` | JSON formatted output |
//! | `QF_LOG_TARGETS` | `true` | Include event targets |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    SubscriberInit(String),
}

/// Span carrying the filter type and instance id
///
/// ```rust,ignore
/// let _span = qf_telemetry::filter_span!("users", instance = %filter.instance_id()).entered();
/// ```
#[macro_export]
macro_rules! filter_span {
    ($filter_type:expr $(, $($field:tt)*)?) => {
        tracing::info_span!("filter", filter = $filter_type $(, $($field)*)?)
    };
}
