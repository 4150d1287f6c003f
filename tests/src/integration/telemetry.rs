//! # Telemetry Scenarios
//!
//! Filter log events routed through `TracingLogger` into a subscriber built
//! from the telemetry configuration.

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use qf_engine::{Feature, Filter, Options, RequestParams, TracingLogger};
    use qf_telemetry::{env_filter, TelemetryConfig};

    use crate::fixtures::{defaults, users_definition, users_query};

    /// Shared in-memory sink for formatted events
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run_logged_filter(config: &TelemetryConfig) -> (String, String) {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter(config).unwrap())
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let instance = tracing::subscriber::with_default(subscriber, || {
            let mut filter = Filter::builder(users_definition())
                .defaults(defaults())
                .feature(Feature::Logging, true)
                .logger(Arc::new(TracingLogger::with_channel("fallback")))
                .input(RequestParams::new().with("status", "active"))
                .build();
            filter.apply(users_query(), Options::new()).unwrap();
            filter.get().unwrap();
            filter.instance_id().to_string()
        });

        (capture.contents(), instance)
    }

    // =========================================================================
    // TracingLogger end to end
    // =========================================================================

    #[test]
    fn test_events_carry_filter_and_instance() {
        let config = TelemetryConfig::default().with_level("debug");
        let (output, instance) = run_logged_filter(&config);

        assert!(output.contains("Filter applied"));
        assert!(output.contains("filter=\"users\"") || output.contains("filter=users"));
        assert!(output.contains(&instance));
        assert!(!output.contains("fallback"));
    }

    #[test]
    fn test_level_directive_filters_events() {
        let config = TelemetryConfig::default().with_level("warn");
        let (output, _) = run_logged_filter(&config);

        assert!(!output.contains("Filter applied"));
    }

    #[test]
    fn test_json_events_are_one_object_per_line() {
        let capture = Capture::default();
        let writer = capture.clone();
        let config = TelemetryConfig::default().with_level("info").json(true);
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(&config).unwrap())
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut filter = Filter::builder(users_definition())
                .defaults(defaults())
                .feature(Feature::Logging, true)
                .logger(Arc::new(TracingLogger::new()))
                .build();
            filter.apply(users_query(), Options::new()).unwrap();
        });

        let output = capture.contents();
        let events: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let applied = events
            .iter()
            .find(|event| event["fields"]["message"] == "Filter applied")
            .unwrap();
        assert_eq!(applied["fields"]["filter"], "users");
        assert_eq!(applied["level"], "INFO");
    }
}
