//! [`FilterLogger`] backed by `tracing`
//!
//! The orchestrator puts `filter` and `instance` into every context; they are
//! lifted into top-level event fields so JSON subscribers can index them. The
//! full context is attached as well.

use serde_json::Value;

use crate::ports::outbound::FilterLogger;

/// Subsystem name attached to every event
pub const SUBSYSTEM: &str = "query-filter";

/// Emits filter log calls as `tracing` events
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    /// Fallback filter name when the context carries none
    channel: Option<String>,
}

/// Fields lifted out of a context object
struct Fields<'a> {
    filter: &'a str,
    instance: &'a str,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
        }
    }

    fn channel(&self) -> &str {
        self.channel.as_deref().unwrap_or("default")
    }

    fn fields<'a>(&'a self, context: &'a Value) -> Fields<'a> {
        let lookup = |key: &str| context.get(key).and_then(Value::as_str);
        Fields {
            filter: lookup("filter").unwrap_or_else(|| self.channel()),
            instance: lookup("instance").unwrap_or("-"),
        }
    }
}

impl FilterLogger for TracingLogger {
    fn info(&self, message: &str, context: &Value) {
        let fields = self.fields(context);
        tracing::info!(
            subsystem = SUBSYSTEM,
            filter = fields.filter,
            instance = fields.instance,
            context = %context,
            "{}",
            message
        );
    }

    fn debug(&self, message: &str, context: &Value) {
        let fields = self.fields(context);
        tracing::debug!(
            subsystem = SUBSYSTEM,
            filter = fields.filter,
            instance = fields.instance,
            context = %context,
            "{}",
            message
        );
    }

    fn warning(&self, message: &str, context: &Value) {
        let fields = self.fields(context);
        tracing::warn!(
            subsystem = SUBSYSTEM,
            filter = fields.filter,
            instance = fields.instance,
            context = %context,
            "{}",
            message
        );
    }
}
