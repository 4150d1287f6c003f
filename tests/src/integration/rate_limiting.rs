//! # Rate Limiting Scenarios
//!
//! Count, complexity and throttle gates are advisory: a rejection is recorded
//! and logged, and dispatch still runs.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use qf_engine::{
        ComplexityScorer, Feature, Filter, FilterDefaults, FilterMetrics, FilterState,
        Filterables, InMemoryQuery, InMemoryRateLimitStore, Options, RateLimitConfig,
        RateLimitStore, Rejection, RequestParams,
    };

    use crate::fixtures::{ids, users_definition, users_query, RecordingLogger};

    fn limited(config: RateLimitConfig) -> Arc<FilterDefaults> {
        Arc::new(
            FilterDefaults {
                rate_limit: config,
                ..Default::default()
            }
            .with_feature(Feature::RateLimit, true),
        )
    }

    fn limited_filter(
        config: RateLimitConfig,
        store: Arc<InMemoryRateLimitStore>,
        params: RequestParams,
    ) -> Filter<InMemoryQuery> {
        Filter::builder(users_definition())
            .defaults(limited(config))
            .rate_limit_store(store)
            .input(params)
            .build()
    }

    #[test]
    fn test_complexity_score_with_weights() {
        let filterables: Filterables = [
            ("q".to_string(), json!("x")),
            ("tags".to_string(), json!(["a", "b", "c"])),
            ("status".to_string(), json!("y")),
        ]
        .into_iter()
        .collect();
        let weights = HashMap::from([("q".to_string(), 5), ("tags".to_string(), 3)]);

        assert_eq!(ComplexityScorer::with_weights(weights).score(&filterables), 15);
    }

    #[test]
    fn test_count_gate_is_advisory() {
        let logger = RecordingLogger::new();
        let mut filter = Filter::builder(users_definition())
            .defaults(limited(RateLimitConfig {
                max_filters: 2,
                ..Default::default()
            }))
            .logger(logger.clone())
            .input(
                RequestParams::new()
                    .with("status", "active")
                    .with("min_age", 20)
                    .with("tags", "viewer"),
            )
            .build();

        filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(filter.rate_limit_passed(), Some(false));
        assert_eq!(filter.state(), FilterState::Applied);
        assert_eq!(ids(&filter.get().unwrap()), vec![3]);
        assert_eq!(
            logger.messages("warning"),
            vec!["Filter rate limit exceeded".to_string()]
        );
    }

    #[test]
    fn test_complexity_gate_reports_score() {
        let mut filter = Filter::builder(users_definition())
            .defaults(limited(RateLimitConfig {
                max_complexity: 14,
                ..Default::default()
            }))
            .input(
                RequestParams::new()
                    .with("q", "a")
                    .with("tags", json!(["admin", "editor", "viewer"]))
                    .with("status", "active"),
            )
            .build();

        filter.apply(users_query(), Options::new()).unwrap();

        let verdict = filter.rate_limit_verdict().unwrap();
        assert_eq!(verdict.score, 15);
        assert_eq!(
            verdict.rejection,
            Some(Rejection::TooComplex { score: 15, max: 14 })
        );
        assert_eq!(filter.state(), FilterState::Applied);
    }

    #[test]
    fn test_throttle_shared_across_instances() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let config = RateLimitConfig {
            max_attempts: 2,
            ..Default::default()
        };

        let verdicts: Vec<Option<bool>> = (0..3)
            .map(|_| {
                let mut filter = limited_filter(
                    config.clone(),
                    store.clone(),
                    RequestParams::new().with("status", "active"),
                );
                filter.for_caller("10.0.0.7");
                filter.apply(users_query(), Options::new()).unwrap();
                assert_eq!(filter.get().unwrap().len(), 2);
                filter.rate_limit_passed()
            })
            .collect();

        assert_eq!(verdicts, vec![Some(true), Some(true), Some(false)]);
        assert_eq!(store.attempts("filter:10.0.0.7:users"), 2);
    }

    #[test]
    fn test_callers_are_throttled_separately() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let config = RateLimitConfig {
            max_attempts: 1,
            ..Default::default()
        };

        for caller in ["a", "b"] {
            let mut filter = limited_filter(config.clone(), store.clone(), RequestParams::new());
            filter.for_caller(caller);
            filter.apply(users_query(), Options::new()).unwrap();
            assert_eq!(filter.rate_limit_passed(), Some(true));
        }
        assert_eq!(store.key_count(), 2);
    }

    #[test]
    fn test_heavy_requests_decay_longer() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let mut filter = limited_filter(
            RateLimitConfig {
                window: Duration::from_millis(50),
                ..Default::default()
            },
            store.clone(),
            RequestParams::new()
                .with("q", "a")
                .with("tags", json!(["admin", "editor", "viewer"])),
        );
        filter.apply(users_query(), Options::new()).unwrap();

        // score 14 → decay of two windows
        std::thread::sleep(Duration::from_millis(70));
        assert_eq!(store.attempts("filter:anonymous:users"), 1);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.attempts("filter:anonymous:users"), 0);
    }

    #[test]
    fn test_rate_limit_feature_off_skips_check() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let mut filter = Filter::builder(users_definition())
            .defaults(limited(RateLimitConfig::default()))
            .feature(Feature::RateLimit, false)
            .rate_limit_store(store.clone())
            .input(RequestParams::new().with("status", "active"))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(filter.rate_limit_passed(), None);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_rejections_counted_with_performance() {
        let metrics = Arc::new(FilterMetrics::new());
        let mut filter = Filter::builder(users_definition())
            .defaults(limited(RateLimitConfig {
                max_filters: 0,
                ..Default::default()
            }))
            .metrics(metrics.clone())
            .feature(Feature::Performance, true)
            .input(RequestParams::new().with("status", "active"))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(metrics.snapshot().rate_limit_rejections, 1);
    }
}
