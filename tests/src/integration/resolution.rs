//! # Filterable Resolution Scenarios
//!
//! Absent-value filtering, declared-key projection of the input source and
//! precedence of appended filterables.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use qf_engine::{
        Filter, FilterDefinition, FilterError, FilterState, InMemoryQuery, Options,
        QueryBuilder, RequestParams,
    };

    use crate::fixtures::{defaults, filter, ids, users_query};

    fn falsy_definition() -> FilterDefinition<InMemoryQuery> {
        ["a", "b", "c", "d", "e", "f"]
            .into_iter()
            .fold(FilterDefinition::builder("falsy"), |builder, key| {
                builder.filter(key, move |q: &mut InMemoryQuery, v| Ok(q.where_eq(key, v)?))
            })
            .build()
    }

    #[test]
    fn test_falsy_values_are_dropped() {
        let params = RequestParams::from_json(json!({
            "a": "",
            "b": null,
            "c": false,
            "d": [],
            "e": 0,
            "f": "0",
        }))
        .unwrap();
        let mut filter = Filter::builder(falsy_definition())
            .defaults(defaults())
            .input(params)
            .build();

        let rows = vec![json!({"e": 0, "f": "0"}), json!({"e": 1, "f": "0"})];
        filter
            .apply(InMemoryQuery::new("falsy", rows), Options::new())
            .unwrap();

        let active: Vec<&String> = filter.active_filterables().keys().collect();
        assert_eq!(active, vec!["e", "f"]);
        assert_eq!(filter.applied_keys(), ["e", "f"]);
        assert_eq!(filter.get().unwrap(), vec![json!({"e": 0, "f": "0"})]);
    }

    #[test]
    fn test_undeclared_input_keys_are_ignored() {
        let mut filter = filter(
            RequestParams::new()
                .with("status", "active")
                .with("password", "hunter2"),
        );

        filter.apply(users_query(), Options::new()).unwrap();

        assert!(!filter.active_filterables().contains_key("password"));
        assert_eq!(filter.state(), FilterState::Applied);
    }

    #[test]
    fn test_appended_values_take_precedence() {
        let mut filter = filter(RequestParams::new().with("status", "active"));
        filter.append_filterable("status", "banned");

        filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(filter.active_filterables()["status"], json!("banned"));
        assert_eq!(ids(&filter.get().unwrap()), vec![4]);
    }

    #[test]
    fn test_appended_absent_value_does_not_mask_input() {
        let mut filter = filter(RequestParams::new().with("status", "active"));
        filter.append_filterable("status", Value::Null);

        filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(ids(&filter.get().unwrap()), vec![1, 3]);
    }

    #[test]
    fn test_dispatch_runs_in_key_order() {
        let mut filter = filter(
            RequestParams::new()
                .with("tags", "editor")
                .with("status", "inactive")
                .with("min_age", 18),
        );

        let query = filter.apply(users_query(), Options::new()).unwrap();

        assert_eq!(query.shape().predicate_count(), 3);
        assert_eq!(filter.applied_keys(), ["min_age", "status", "tags"]);
    }

    #[test]
    fn test_non_object_json_input_is_rejected() {
        let err = RequestParams::from_json(json!(["status", "active"])).unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput(_)));
        assert!(err.to_string().contains("JSON object"));
    }
}
