//! # Query-Filter Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Cache key derivation | linear in filterable count |
//! | Complexity scoring | linear in filterable count |
//! | apply + get (direct) | dominated by the query scan |
//! | apply + get (cache hit) | no query execution after warm-up |
//! | Lazy pass | one fetch per chunk |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use qf_engine::{
    CacheKeyBuilder, ComplexityScorer, Feature, Filter, Filterables, InMemoryCacheStore,
    InMemoryQuery, Options, RequestParams,
};
use qf_tests::fixtures::{defaults, numbered_rows, users_definition};

fn filterables(n: usize) -> Filterables {
    (0..n)
        .map(|i| {
            let value = if i % 3 == 0 {
                json!(["a", "b", "c"])
            } else {
                json!(format!("value-{}", i))
            };
            (format!("key_{:03}", i), value)
        })
        .collect()
}

// ============================================================================
// Cache keys and scoring
// ============================================================================

fn bench_cache_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache-key");
    let builder = CacheKeyBuilder::new("users");
    let principal = json!(42);

    for size in [1usize, 10, 50, 200] {
        let input = filterables(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("build", size), &input, |b, input| {
            b.iter(|| black_box(builder.build(input, Some(&principal))))
        });
    }

    group.finish();
}

fn bench_complexity_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("complexity");
    let scorer = ComplexityScorer::new();

    for size in [10usize, 200] {
        let input = filterables(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("score", size), &input, |b, input| {
            b.iter(|| black_box(scorer.score(input)))
        });
    }

    group.finish();
}

// ============================================================================
// Orchestration
// ============================================================================

fn bench_apply_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply-get");
    group.measurement_time(Duration::from_secs(10));

    let rows = Arc::new(numbered_rows(10_000));
    let params = || {
        RequestParams::new()
            .with("status", "active")
            .with("min_age", 40)
    };

    group.bench_function("direct", |b| {
        b.iter(|| {
            let mut filter = Filter::builder(users_definition())
                .defaults(defaults())
                .input(params())
                .build();
            let query = InMemoryQuery::from_shared("users", rows.clone());
            let _ = filter.apply(query, Options::new());
            black_box(filter.get().map(|r| r.len()).unwrap_or_default())
        })
    });

    let store = Arc::new(InMemoryCacheStore::new(1_000));
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            let mut filter = Filter::builder(users_definition())
                .defaults(defaults())
                .cache(store.clone())
                .input(params())
                .build();
            filter.cache_results(true);
            let query = InMemoryQuery::from_shared("users", rows.clone());
            let _ = filter.apply(query, Options::new());
            black_box(filter.get().map(|r| r.len()).unwrap_or_default())
        })
    });

    group.finish();
}

fn bench_lazy_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming");
    let rows = Arc::new(numbered_rows(10_000));

    for chunk in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("lazy_reduce", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut filter = Filter::builder(users_definition())
                    .defaults(defaults())
                    .feature(Feature::MemoryManagement, true)
                    .input(RequestParams::new().with("status", "active"))
                    .build();
                filter.chunk_size_option(chunk);
                let _ = filter.attach_query(
                    InMemoryQuery::from_shared("users", rows.clone()),
                    Options::new(),
                );
                black_box(filter.lazy_reduce(0usize, |n, _| n + 1).unwrap_or_default())
            })
        });
    }

    group.finish();
}

criterion_group!(keys, bench_cache_key, bench_complexity_score);
criterion_group!(orchestration, bench_apply_get, bench_lazy_pass);
criterion_main!(keys, orchestration);
