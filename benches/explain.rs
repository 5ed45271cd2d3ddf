//! Benchmark suite for the explanation pipeline
//!
//! Measures end-to-end explain latency, the cache-hit fast path, and the
//! individual attribution and surrogate stages.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use explicar::attribution::{AttributionConfig, AttributionEngine};
use explicar::cache::CacheConfig;
use explicar::domain::{ClassProfile, DomainTables};
use explicar::engine::{EngineConfig, ExplanationEngine};
use explicar::error::Deadline;
use explicar::input::{PredictionContext, PredictionInput};
use explicar::surrogate::{Predictor, SurrogateConfig, SurrogateEngine};
use explicar::Result;

struct LinearModel;

impl Predictor for LinearModel {
    fn predict(
        &self,
        features: &BTreeMap<String, f64>,
        _context: &PredictionContext,
    ) -> Result<f64> {
        Ok(200.0 + features.values().sum::<f64>() * 0.1)
    }
}

fn create_tables(num_features: usize) -> DomainTables {
    let mut profile = ClassProfile::new(250.0);
    for i in 0..num_features {
        profile = profile.with_feature(&format!("feature_{i}"), 100.0, 0.1);
    }
    DomainTables::default().with_class("player", profile)
}

fn create_input(num_features: usize) -> PredictionInput {
    let mut input = PredictionInput::new("bench-1", "player", "model-v1");
    for i in 0..num_features {
        input = input.with_feature(&format!("feature_{i}"), 100.0 + i as f64 * 7.0);
    }
    input
}

fn benchmark_explain_fresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain_fresh");

    for num_samples in [50, 100, 200] {
        let config = EngineConfig {
            cache: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            surrogate: SurrogateConfig {
                num_samples,
                ..SurrogateConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = ExplanationEngine::new(config, create_tables(4), Arc::new(LinearModel));
        let input = create_input(4);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_samples),
            &num_samples,
            |b, _| {
                b.iter(|| {
                    let record = engine.explain(black_box(&input), black_box(260.0)).unwrap();
                    black_box(record)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_explain_cache_hit(c: &mut Criterion) {
    let engine = ExplanationEngine::new(EngineConfig::default(), create_tables(4), Arc::new(LinearModel));
    let input = create_input(4);
    engine.explain(&input, 260.0).unwrap();

    c.bench_function("explain_cache_hit", |b| {
        b.iter(|| {
            let record = engine.explain(black_box(&input), black_box(260.0)).unwrap();
            black_box(record)
        });
    });
}

fn benchmark_attribution(c: &mut Criterion) {
    let engine = AttributionEngine::new(AttributionConfig::default());
    let mut group = c.benchmark_group("attribution");

    for num_features in [2, 4, 8, 16] {
        let tables = create_tables(num_features);
        let input = create_input(num_features);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_features),
            &num_features,
            |b, _| {
                b.iter(|| {
                    let result =
                        engine.compute(black_box(&input), black_box(260.0), black_box(&tables));
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_surrogate_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("surrogate_fit");

    for num_samples in [50, 100, 200] {
        let engine = SurrogateEngine::new(SurrogateConfig {
            num_samples,
            ..SurrogateConfig::default()
        });
        let input = create_input(4);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_samples),
            &num_samples,
            |b, _| {
                b.iter(|| {
                    let deadline = Deadline::new(Duration::from_secs(30));
                    let result = engine
                        .compute(black_box(&input), black_box(260.0), &LinearModel, &deadline)
                        .unwrap();
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_batch(c: &mut Criterion) {
    let config = EngineConfig {
        cache: CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        },
        surrogate: SurrogateConfig {
            num_samples: 50,
            ..SurrogateConfig::default()
        },
        ..EngineConfig::default()
    };
    let engine = ExplanationEngine::new(config, create_tables(4), Arc::new(LinearModel));

    c.bench_function("explain_batch_8", |b| {
        b.iter(|| {
            let batch: Vec<_> = (0..8)
                .map(|i| (create_input(4).with_feature("feature_0", 100.0 + f64::from(i)), 260.0))
                .collect();
            let results = engine.explain_batch(black_box(batch));
            black_box(results)
        });
    });
}

criterion_group!(
    benches,
    benchmark_explain_fresh,
    benchmark_explain_cache_hit,
    benchmark_attribution,
    benchmark_surrogate_fit,
    benchmark_batch,
);
criterion_main!(benches);
