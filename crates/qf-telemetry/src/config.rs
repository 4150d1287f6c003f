//! Telemetry configuration from environment variables.

use std::env;

/// Subscriber configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Log level filter directive (`info`, `qf_engine=debug`, ...)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to include event targets
    pub with_targets: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            with_targets: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `QF_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
    /// - `QF_JSON_LOGS`: JSON output (default: false)
    /// - `QF_LOG_TARGETS`: include targets (default: true)
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("QF_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("QF_JSON_LOGS")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),

            with_targets: env::var("QF_LOG_TARGETS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
