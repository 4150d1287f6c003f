//! # Property Tests
//!
//! Invariants that must hold for arbitrary inputs:
//! - cache keys do not depend on insertion order
//! - absent values never change a cache key
//! - scores are additive over keys
//! - resolution never yields absent values

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use qf_engine::domain::is_absent;
    use qf_engine::domain::resolver::resolve;
    use qf_engine::{
        CacheKeyBuilder, ComplexityScorer, Filterables, InputSource, RequestParams,
    };

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 %&=]{1,12}".prop_map(Value::String),
            Just(json!(true)),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        prop_oneof![
            3 => scalar(),
            1 => proptest::collection::vec(scalar(), 1..4).prop_map(Value::Array),
        ]
    }

    fn entries() -> impl Strategy<Value = Vec<(String, Value)>> {
        proptest::collection::btree_map("[a-z_]{1,8}", value(), 0..8)
            .prop_map(|map| map.into_iter().collect())
    }

    fn absent() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            Just(json!("")),
            Just(json!(false)),
            Just(json!([])),
        ]
    }

    fn insert_in_order(entries: &[(String, Value)]) -> Filterables {
        let mut filterables = Filterables::new();
        for (key, value) in entries {
            filterables.insert(key.clone(), value.clone());
        }
        filterables
    }

    proptest! {
        #[test]
        fn cache_key_ignores_insertion_order(
            (original, shuffled) in entries().prop_flat_map(|entries| {
                (Just(entries.clone()), Just(entries).prop_shuffle())
            })
        ) {
            let builder = CacheKeyBuilder::new("users");
            let principal = json!(42);
            prop_assert_eq!(
                builder.build(&insert_in_order(&original), Some(&principal)),
                builder.build(&insert_in_order(&shuffled), Some(&principal))
            );
        }

        #[test]
        fn request_params_order_does_not_change_key(
            (original, shuffled) in entries().prop_flat_map(|entries| {
                (Just(entries.clone()), Just(entries).prop_shuffle())
            })
        ) {
            let keys: Vec<String> = original.iter().map(|(k, _)| k.clone()).collect();
            let first = original
                .iter()
                .fold(RequestParams::new(), |params, (k, v)| params.with(k.clone(), v.clone()));
            let second = shuffled
                .iter()
                .fold(RequestParams::new(), |params, (k, v)| params.with(k.clone(), v.clone()));

            let builder = CacheKeyBuilder::new("users");
            prop_assert_eq!(
                builder.build(&resolve(first.only(&keys), &Filterables::new()), None),
                builder.build(&resolve(second.only(&keys), &Filterables::new()), None)
            );
        }

        #[test]
        fn absent_values_do_not_change_key(
            entries in entries(),
            extra_key in "[A-Z]{1,4}",
            extra in absent()
        ) {
            let builder = CacheKeyBuilder::new("users");
            let base = insert_in_order(&entries);
            let mut padded = base.clone();
            padded.insert(extra_key, extra);

            prop_assert_eq!(builder.build(&base, None), builder.build(&padded, None));
        }

        #[test]
        fn distinct_scalars_give_distinct_keys(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let builder = CacheKeyBuilder::new("users");
            let first: Filterables = [("n".to_string(), json!(a))].into_iter().collect();
            let second: Filterables = [("n".to_string(), json!(b))].into_iter().collect();
            prop_assert_ne!(builder.build(&first, None), builder.build(&second, None));
        }

        #[test]
        fn score_is_sum_of_per_key_scores(entries in entries()) {
            let scorer = ComplexityScorer::new();
            let all = insert_in_order(&entries);
            let summed: u32 = entries
                .iter()
                .map(|(k, v)| scorer.score(&insert_in_order(&[(k.clone(), v.clone())])))
                .sum();
            prop_assert_eq!(scorer.score(&all), summed);
        }

        #[test]
        fn resolution_drops_every_absent_value(
            present in entries(),
            missing in proptest::collection::btree_map("[A-Z]{1,4}", absent(), 0..4)
        ) {
            let mut source = insert_in_order(&present);
            source.extend(missing);
            let resolved = resolve(source, &Filterables::new());
            prop_assert!(resolved.values().all(|v| !is_absent(v)));
        }
    }
}
