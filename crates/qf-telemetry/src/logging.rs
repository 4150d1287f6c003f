//! Subscriber installation.
//!
//! Development gets the compact `fmt` layer; containers set `QF_JSON_LOGS` to
//! get one JSON object per event so the `context` field filter events carry
//! can be indexed.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Filter from the configured directive
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Filter {
        filter: config.log_level.clone(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(config)?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_targets)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(config.with_targets)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    }

    tracing::debug!(
        level = %config.log_level,
        json_logs = config.json_logs,
        "Filter logging initialized"
    );
    Ok(())
}
