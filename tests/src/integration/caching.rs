//! # Caching Scenarios
//!
//! Smart-caching heuristic, read-through behavior, count caching and
//! tag-based invalidation against the LRU store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use qf_engine::service::AlwaysCache;
    use qf_engine::{
        Actor, CacheKeyBuilder, CacheStore, Feature, Filter, FilterDefaults, FilterMetrics,
        InMemoryCacheStore, InMemoryQuery, Options, RequestParams,
    };

    use crate::fixtures::{defaults, ids, users, users_definition, users_query};

    fn cached_filter(store: Arc<InMemoryCacheStore>, params: RequestParams) -> Filter<InMemoryQuery> {
        Filter::builder(users_definition())
            .defaults(defaults())
            .cache(store)
            .input(params)
            .build()
    }

    #[test]
    fn test_single_equality_skips_cache() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = cached_filter(store.clone(), RequestParams::new().with("status", "active"));

        filter.apply(users_query(), Options::new()).unwrap();
        assert_eq!(ids(&filter.get().unwrap()), vec![1, 3]);

        assert_eq!(store.stats().remember_calls, 0);
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn test_two_predicates_read_through() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let query = users_query();
        let executions = query.clone();
        let mut filter = cached_filter(
            store.clone(),
            RequestParams::new().with("status", "active").with("min_age", 30),
        );

        filter.apply(query, Options::new()).unwrap();
        assert_eq!(ids(&filter.get().unwrap()), vec![1]);
        assert_eq!(ids(&filter.get().unwrap()), vec![1]);

        let stats = store.stats();
        assert_eq!(stats.remember_calls, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(executions.executions(), 1);
    }

    #[test]
    fn test_join_reads_through() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let owners = InMemoryQuery::new(
            "owners",
            vec![
                serde_json::json!({"id": 10, "team": "core"}),
                serde_json::json!({"id": 20, "team": "edge"}),
            ],
        );
        let mut joined = users_query();
        joined.join(&owners, "owner_id", "id").unwrap();
        let mut filter = cached_filter(store.clone(), RequestParams::new().with("status", "active"));

        filter.apply(joined, Options::new()).unwrap();
        assert_eq!(filter.get().unwrap().len(), 2);
        assert_eq!(store.stats().remember_calls, 1);
    }

    #[test]
    fn test_smart_caching_disabled_caches_everything() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut config = FilterDefaults::default();
        config.cache.smart = false;
        let mut filter = Filter::builder(users_definition())
            .defaults(Arc::new(config))
            .cache(store.clone())
            .input(RequestParams::new().with("status", "active"))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();

        assert_eq!(store.stats().remember_calls, 1);
    }

    #[test]
    fn test_policy_injection() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = Filter::builder(users_definition())
            .defaults(defaults())
            .cache(store.clone())
            .cache_policy(Arc::new(AlwaysCache))
            .input(RequestParams::new().with("status", "active"))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();

        assert_eq!(store.stats().remember_calls, 1);
    }

    #[test]
    fn test_forced_off_bypasses_store() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = cached_filter(
            store.clone(),
            RequestParams::new().with("status", "active").with("min_age", 30),
        );
        filter.cache_results(false);

        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();

        assert_eq!(store.stats().remember_calls, 0);
    }

    #[test]
    fn test_caching_feature_off_bypasses_store() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = Filter::builder(users_definition())
            .defaults(defaults())
            .cache(store.clone())
            .feature(Feature::Caching, false)
            .input(RequestParams::new().with("status", "active").with("min_age", 30))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();

        assert_eq!(store.stats().remember_calls, 0);
    }

    #[test]
    fn test_count_cache_uses_suffix_and_own_ttl() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = cached_filter(store.clone(), RequestParams::new().with("status", "active"));
        filter.cache_count(true);

        filter.apply(users_query(), Options::new()).unwrap();
        assert_eq!(filter.count().unwrap(), 2);
        assert_eq!(filter.count().unwrap(), 2);

        let key = filter.cache_key();
        assert!(key.count_key().as_str().ends_with(":count"));
        assert!(store.contains(key.count_key().as_str()));
        assert!(!store.contains(key.as_str()));
    }

    #[test]
    fn test_cache_key_matches_builder() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = cached_filter(store, RequestParams::new().with("status", "active"));
        filter.for_principal(Arc::new(Actor::new(10)));

        filter.apply(users_query(), Options::new()).unwrap();

        let expected = CacheKeyBuilder::new("users").build(
            filter.active_filterables(),
            Some(&serde_json::json!(10)),
        );
        assert_eq!(filter.cache_key(), expected);
        assert!(expected.as_str().starts_with("users:p-10:"));
    }

    #[test]
    fn test_clear_related_caches_flushes_shared_tags() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        store.put(
            "unrelated",
            bytes_of("1"),
            Duration::from_secs(60),
            &["billing".to_string()],
        );

        let mut first = cached_filter(
            store.clone(),
            RequestParams::new().with("status", "active").with("min_age", 30),
        );
        first.apply(users_query(), Options::new()).unwrap();
        first.get().unwrap();

        let mut second = cached_filter(
            store.clone(),
            RequestParams::new().with("tags", "editor").with("min_age", 30),
        );
        second.apply(users_query(), Options::new()).unwrap();
        second.get().unwrap();
        assert_eq!(store.stats().entries, 3);

        // Both instances share the filter type and the "directory" tag
        assert_eq!(first.clear_related_caches(), 2);
        assert_eq!(store.stats().entries, 1);
        assert!(store.contains("unrelated"));
    }

    #[test]
    fn test_clear_cache_forgets_own_entries() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let mut filter = cached_filter(
            store.clone(),
            RequestParams::new().with("status", "active").with("min_age", 30),
        );
        filter.cache_count(true);
        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();
        filter.count().unwrap();

        assert!(filter.clear_cache());
        assert_eq!(store.stats().entries, 0);
        assert!(!filter.clear_cache());
    }

    #[test]
    fn test_cache_metrics_with_performance() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let metrics = Arc::new(FilterMetrics::new());
        let mut filter = Filter::builder(users_definition())
            .defaults(defaults())
            .cache(store)
            .metrics(metrics.clone())
            .feature(Feature::Performance, true)
            .input(RequestParams::new().with("status", "active").with("min_age", 30))
            .build();

        filter.apply(users_query(), Options::new()).unwrap();
        filter.get().unwrap();
        filter.get().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert!((metrics.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_store_across_instances() {
        let store = Arc::new(InMemoryCacheStore::new(64));
        let params = RequestParams::new().with("status", "active").with("min_age", 30);

        let mut first = cached_filter(store.clone(), params.clone());
        first.apply(users_query(), Options::new()).unwrap();
        first.get().unwrap();

        // Different rows behind the same key: the cached result wins
        let mut second = cached_filter(store.clone(), params);
        second
            .apply(InMemoryQuery::new("users", users()[..1].to_vec()), Options::new())
            .unwrap();
        assert_eq!(ids(&second.get().unwrap()), vec![1]);
        assert_eq!(first.cache_key(), second.cache_key());
        assert_eq!(store.stats().hits, 1);
    }

    fn bytes_of(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }
}
