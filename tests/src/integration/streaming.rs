//! # Streaming Scenarios
//!
//! Memory-bounded execution over the in-memory adapter: paged lazy passes,
//! chunk callbacks, cursors and finalize-on-demand.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use qf_engine::{
        Feature, Filter, FilterDefaults, FilterError, FilterResult, FilterState, InMemoryQuery,
        Options, RequestParams, StreamingConfig,
    };

    use crate::fixtures::{numbered_rows, users_definition};

    const ROWS: usize = 250;

    fn streaming_filter(chunk_size: usize, params: RequestParams) -> Filter<InMemoryQuery> {
        let defaults = FilterDefaults {
            streaming: StreamingConfig { chunk_size },
            ..Default::default()
        };
        Filter::builder(users_definition())
            .defaults(Arc::new(defaults))
            .input(params)
            .build()
    }

    fn numbered() -> InMemoryQuery {
        InMemoryQuery::new("users", numbered_rows(ROWS))
    }

    fn id(row: &Value) -> i64 {
        row["id"].as_i64().unwrap_or_default()
    }

    #[test]
    fn test_lazy_pass_pages_through_rows() {
        let query = numbered();
        let executions = query.clone();
        let mut filter = streaming_filter(40, RequestParams::new().with("status", "active"));
        filter.attach_query(query, Options::new()).unwrap();

        let lazy = filter.lazy().unwrap();
        assert_eq!(lazy.chunk_size(), 40);
        assert_eq!(lazy.iter().count(), ROWS / 2);
        // 125 rows in pages of 40: four fetches
        assert_eq!(executions.executions(), 4);
    }

    #[test]
    fn test_lazy_sequence_is_restartable() {
        let mut filter = streaming_filter(16, RequestParams::new());
        filter.attach_query(numbered(), Options::new()).unwrap();

        let lazy = filter.lazy().unwrap();
        let first: Vec<i64> = lazy.iter().map(|r| id(&r.unwrap())).collect();
        let second: Vec<i64> = lazy.iter().map(|r| id(&r.unwrap())).collect();
        assert_eq!(first.len(), ROWS);
        assert_eq!(first, second);
    }

    #[test]
    fn test_map_filter_reduce() {
        let mut filter = streaming_filter(32, RequestParams::new().with("min_age", 70));
        filter.attach_query(numbered(), Options::new()).unwrap();

        let ages: Vec<i64> = filter
            .lazy_map(|row| row["age"].as_i64().unwrap_or_default())
            .unwrap()
            .collect::<FilterResult<_>>()
            .unwrap();
        assert!(ages.iter().all(|age| *age >= 70));

        let even = filter
            .lazy_filter(|row| id(row) % 2 == 0)
            .unwrap()
            .count();
        assert_eq!(even, ages.len() / 2);

        let total = filter.lazy_reduce(0, |acc, row| acc + id(&row)).unwrap();
        assert!(total > 0);

        let mut visited = 0;
        assert_eq!(filter.lazy_each(|_| visited += 1).unwrap(), ages.len());
        assert_eq!(visited, ages.len());
    }

    #[test]
    fn test_chunk_callback_can_stop_early() {
        let mut filter = streaming_filter(1000, RequestParams::new());
        filter.attach_query(numbered(), Options::new()).unwrap();

        let mut seen = Vec::new();
        let completed = filter
            .chunk(100, |chunk| {
                seen.push(chunk.len());
                seen.len() < 2
            })
            .unwrap();

        assert!(!completed);
        assert_eq!(seen, vec![100, 100]);
    }

    #[test]
    fn test_cursor_is_single_pass() {
        let mut filter = streaming_filter(10, RequestParams::new().with("status", "inactive"));
        filter.attach_query(numbered(), Options::new()).unwrap();

        let mut cursor = filter.cursor().unwrap();
        assert_eq!(cursor.next().map(|row| id(&row)), Some(1));
        assert_eq!(cursor.count(), ROWS / 2 - 1);
    }

    #[test]
    fn test_memory_management_get_matches_direct_get() {
        let params = RequestParams::new().with("status", "active");

        let mut direct = streaming_filter(7, params.clone());
        direct.apply(numbered(), Options::new()).unwrap();

        let mut chunked = streaming_filter(7, params);
        chunked.enable_feature(Feature::MemoryManagement).unwrap();
        chunked.apply(numbered(), Options::new()).unwrap();

        assert_eq!(direct.get().unwrap(), chunked.get().unwrap());
        assert_eq!(chunked.collect_chunked().unwrap().len(), ROWS / 2);
    }

    #[test]
    fn test_chunk_size_option_overrides_default() {
        let mut filter = streaming_filter(1000, RequestParams::new());
        filter.chunk_size_option(25);
        filter.apply(numbered(), Options::new()).unwrap();

        assert_eq!(filter.chunk_size(), 25);
        assert_eq!(filter.lazy().unwrap().chunk_size(), 25);
    }

    #[test]
    fn test_streaming_without_query_errors() {
        let mut filter = streaming_filter(10, RequestParams::new());
        assert!(matches!(filter.lazy(), Err(FilterError::MissingQuery)));
        assert_eq!(filter.state(), FilterState::Initialized);
    }

    #[test]
    fn test_streaming_refuses_failed_instance() {
        let mut filter = streaming_filter(10, RequestParams::new().with("created_between", 5));
        filter.attach_query(numbered(), Options::new()).unwrap();

        assert!(matches!(filter.lazy(), Err(FilterError::Failed { .. })));
        assert!(matches!(
            filter.lazy_reduce(0, |acc, _| acc + 1),
            Err(FilterError::Failed { .. })
        ));
        assert_eq!(filter.state(), FilterState::Failed);
    }
}
