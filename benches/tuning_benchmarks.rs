//! Benchmarks for the hot recording path and recommendation computation.

#![allow(clippy::expect_used, clippy::cast_possible_truncation)]

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ttl_tuner::metrics::CostSample;
use ttl_tuner::{
    AdaptiveAlgorithm, AlgorithmKind, ReinforcementLearningAlgorithm, TunerConfig, TuningEngine,
};

/// Engine with `keys` warm keys, each past the cold-start threshold.
fn warm_engine(config: TunerConfig, keys: usize) -> TuningEngine {
    let engine = TuningEngine::new(config);
    for i in 0..keys {
        let key = format!("key:{i}");
        engine.on_miss(&key);
        for _ in 0..20 {
            engine.on_hit(&key);
        }
        engine.record_cost(&key, CostSample::new(Duration::from_millis(50), 4096, 0.0));
    }
    engine
}

/// Benchmark: recording a hit on an existing key
fn bench_record_hit(c: &mut Criterion) {
    let engine = warm_engine(TunerConfig::default(), 1);
    c.bench_function("record_hit", |b| {
        b.iter(|| engine.on_hit(black_box("key:0")));
    });
}

/// Benchmark: recording hits spread over a growing key set
fn bench_record_hit_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_hit_many_keys");

    for size in [100_usize, 1_000, 10_000] {
        let engine = warm_engine(TunerConfig::default(), size);
        let keys: Vec<String> = (0..size).map(|i| format!("key:{i}")).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    engine.on_hit(black_box(key));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark: recommendation per algorithm
fn bench_recommend(c: &mut Criterion) {
    let mut group = c.benchmark_group("recommend");

    for kind in [AlgorithmKind::Adaptive, AlgorithmKind::ReinforcementLearning] {
        let engine = warm_engine(
            TunerConfig {
                algorithm: kind,
                rl_seed: Some(7),
                ..TunerConfig::default()
            },
            1,
        );
        group.bench_function(engine.algorithm_name(), |b| {
            b.iter(|| black_box(engine.get_recommended_ttl(black_box("key:0"))));
        });
    }
    group.finish();
}

/// Benchmark: algorithms called directly on a fixed snapshot
fn bench_algorithms_direct(c: &mut Criterion) {
    use ttl_tuner::TuningAlgorithm;

    let config = TunerConfig::default();
    let engine = warm_engine(config.clone(), 1);
    let snapshot = engine.get_metrics("key:0").expect("warm key");
    let adaptive = AdaptiveAlgorithm::new();
    let rl = ReinforcementLearningAlgorithm::with_seed(7);

    c.bench_function("adaptive_direct", |b| {
        b.iter(|| black_box(adaptive.recommend(black_box(&snapshot), &config)));
    });
    c.bench_function("rl_direct", |b| {
        b.iter(|| black_box(rl.recommend(black_box(&snapshot), &config)));
    });
}

/// Benchmark: cleanup over a store above its cap
fn bench_cleanup(c: &mut Criterion) {
    c.bench_function("cleanup_over_cap", |b| {
        b.iter_batched(
            || {
                warm_engine(
                    TunerConfig {
                        max_tracked_entries: 500,
                        ..TunerConfig::default()
                    },
                    1_000,
                )
            },
            |engine| black_box(engine.run_cleanup()),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_record_hit,
    bench_record_hit_many_keys,
    bench_recommend,
    bench_algorithms_direct,
    bench_cleanup
);
criterion_main!(benches);
