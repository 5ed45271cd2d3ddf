//! Explanation engine orchestration
//!
//! The engine wires the sub-engines together behind a single `explain`
//! call: validate, fingerprint, consult the cache, claim the fingerprint in
//! the concurrency guard, run attribution and the surrogate side by side,
//! derive the narrative and charts, then assemble, cache, and report the
//! record. Every admitted run emits lifecycle events and lands in the
//! metrics window, and the in-flight claim is released on every exit path,
//! including panics inside a sub-engine.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use explicar::domain::{ClassProfile, DomainTables};
//! use explicar::engine::{EngineConfig, ExplanationEngine};
//! use explicar::error::Result;
//! use explicar::input::{PredictionContext, PredictionInput};
//! use explicar::surrogate::Predictor;
//!
//! struct SumModel;
//! impl Predictor for SumModel {
//!     fn predict(&self, features: &BTreeMap<String, f64>, _: &PredictionContext) -> Result<f64> {
//!         Ok(features.values().sum())
//!     }
//! }
//!
//! let tables = DomainTables::default().with_class(
//!     "quarterback",
//!     ClassProfile::new(250.0).with_feature("passing_yards", 250.0, 0.08),
//! );
//! let engine = ExplanationEngine::new(EngineConfig::default(), tables, Arc::new(SumModel));
//!
//! let input = PredictionInput::new("pred-1", "quarterback", "model-v1")
//!     .with_feature("passing_yards", 300.0);
//! let record = engine.explain(&input, 300.0).unwrap();
//! assert_eq!(record.prediction_id, "pred-1");
//! assert!(!record.is_cache_hit());
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionConfig, AttributionEngine};
use crate::cache::{CacheConfig, CacheStats, ExplanationCache};
use crate::domain::{DomainProvider, DomainTables};
use crate::error::{Deadline, ExplicarError, Result};
use crate::events::{EventEmitter, EventSink, LifecycleEvent};
use crate::guard::{Admission, ConcurrencyGuard, InFlightPermit};
use crate::input::{Fingerprint, PredictionInput};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::narrative::{confidence_level, NarrativeConfig, NarrativeGenerator};
use crate::record::{ExplanationRecord, PerformanceBlock, PredictionInterval};
use crate::surrogate::{Predictor, SurrogateConfig, SurrogateEngine};
use crate::viz::{VisualizationBuilder, VisualizationConfig};

/// How concurrent requests for the same fingerprint are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Reject the duplicate immediately with `AlreadyInProgress`
    #[default]
    FailFast,
    /// Wait for the winning computation, then serve its cached record
    Block,
}

/// Limits on concurrent explanation work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Cap on distinct computations in flight; 0 means no cap
    #[serde(default)]
    pub max_in_flight: usize,
    /// Deadline for one explanation run, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Policy for duplicate fingerprints
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 0,
            timeout_ms: default_timeout_ms(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

/// Complete engine configuration
///
/// Every section has workable defaults; a JSON config may override any
/// subset of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Master switch; a disabled engine rejects every call untouched
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Attribution engine settings
    #[serde(default)]
    pub attribution: AttributionConfig,
    /// Surrogate engine settings
    #[serde(default)]
    pub surrogate: SurrogateConfig,
    /// Narrative generator settings
    #[serde(default)]
    pub narrative: NarrativeConfig,
    /// Visualization builder settings
    #[serde(default)]
    pub visualization: VisualizationConfig,
    /// Explanation cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Concurrency and deadline settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

fn default_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attribution: AttributionConfig::default(),
            surrogate: SurrogateConfig::default(),
            narrative: NarrativeConfig::default(),
            visualization: VisualizationConfig::default(),
            cache: CacheConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the document does not deserialize.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExplicarError::InvalidInput {
            reason: format!("engine config JSON: {e}"),
        })
    }
}

/// Prediction explanation engine
///
/// Owns the sub-engines, the cache, the concurrency guard, metrics, and
/// the event emitter. All methods take `&self`; one engine instance serves
/// many threads.
pub struct ExplanationEngine {
    config: EngineConfig,
    domain: DomainProvider,
    predictor: Arc<dyn Predictor>,
    attribution: AttributionEngine,
    surrogate: SurrogateEngine,
    narrative: NarrativeGenerator,
    visualization: VisualizationBuilder,
    cache: ExplanationCache,
    guard: ConcurrencyGuard,
    metrics: MetricsCollector,
    emitter: EventEmitter,
}

impl ExplanationEngine {
    /// Build an engine from configuration, domain tables, and a predictor
    #[must_use]
    pub fn new(
        config: EngineConfig,
        tables: DomainTables,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            attribution: AttributionEngine::new(config.attribution.clone()),
            surrogate: SurrogateEngine::new(config.surrogate.clone()),
            narrative: NarrativeGenerator::new(config.narrative.clone()),
            visualization: VisualizationBuilder::new(config.visualization.clone()),
            cache: ExplanationCache::new(config.cache.clone()),
            guard: ConcurrencyGuard::new(config.concurrency.max_in_flight),
            metrics: MetricsCollector::new(),
            emitter: EventEmitter::null(),
            domain: DomainProvider::new(tables),
            predictor,
            config,
        }
    }

    /// Route lifecycle events into `sink` instead of discarding them
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.emitter = EventEmitter::new(sink);
        self
    }

    /// Explain one prediction
    ///
    /// Serves a cached record when a fresh one exists; otherwise claims the
    /// fingerprint, runs the sub-engines under the configured deadline, and
    /// returns the assembled record.
    ///
    /// # Errors
    ///
    /// `EngineDisabled` when the engine is switched off, `InvalidInput` for
    /// inputs that fail boundary validation, `AlreadyInProgress` for
    /// duplicate or over-capacity requests under the fail-fast policy,
    /// `Timeout` when the deadline passes, and `Computation` when a
    /// sub-engine or the predictor fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn explain(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
    ) -> Result<ExplanationRecord> {
        if !self.config.enabled {
            return Err(ExplicarError::EngineDisabled);
        }
        input.validate()?;
        if !predicted_value.is_finite() {
            return Err(ExplicarError::InvalidInput {
                reason: "predicted value is not finite".to_string(),
            });
        }

        let start = Instant::now();
        let deadline = Deadline::new(Duration::from_millis(self.config.concurrency.timeout_ms));
        let fingerprint = input.fingerprint();

        if let Some(record) = self.cache.get(&fingerprint) {
            return Ok(self.serve_cached(record, start));
        }

        let admitted = self.admit(&fingerprint, &deadline, start)?;
        let _permit = match admitted {
            Admitted::Permit(permit) => permit,
            Admitted::Cached(record) => return Ok(record),
        };

        let explanation_id = uuid::Uuid::new_v4().to_string();
        self.emitter.emit(LifecycleEvent::Started {
            explanation_id: explanation_id.clone(),
            prediction_id: input.prediction_id.clone(),
            fingerprint: fingerprint.digest(),
        });

        match self.run_pipeline(input, predicted_value, &deadline, &explanation_id, start) {
            Ok(record) => {
                self.cache.put(&fingerprint, record.clone());
                self.metrics.record_success(start.elapsed(), false);
                self.emitter.emit(LifecycleEvent::Completed {
                    explanation_id,
                    prediction_id: record.prediction_id.clone(),
                    elapsed_ms: record.performance.elapsed_ms,
                    confidence: record.confidence(),
                    cache_hit: false,
                });
                Ok(record)
            }
            Err(error) => {
                let timed_out = matches!(error, ExplicarError::Timeout { .. });
                self.metrics.record_failure(start.elapsed(), timed_out);
                self.emitter.emit(LifecycleEvent::Failed {
                    explanation_id,
                    prediction_id: input.prediction_id.clone(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Explain a batch of predictions on the rayon thread pool
    ///
    /// Results come back in input order. Each entry succeeds or fails
    /// independently; duplicate fingerprints inside one batch follow the
    /// configured dedup policy like any other concurrent callers.
    pub fn explain_batch(
        &self,
        batch: Vec<(PredictionInput, f64)>,
    ) -> Vec<Result<ExplanationRecord>> {
        batch
            .into_par_iter()
            .map(|(input, predicted_value)| self.explain(&input, predicted_value))
            .collect()
    }

    /// Snapshot of the engine metrics
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Metrics in Prometheus exposition format
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        self.metrics.to_prometheus()
    }

    /// Health over the rolling window of recent runs
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.metrics
            .is_healthy(Duration::from_millis(self.config.concurrency.timeout_ms))
    }

    /// Drop every cached record
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Snapshot of the cache behavior counters
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of computations currently in flight
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.guard.in_flight_count()
    }

    /// Replace the domain tables for subsequent runs
    ///
    /// Runs already in flight keep the snapshot they started with.
    pub fn reload_domain(&self, tables: DomainTables) {
        self.domain.reload(tables);
    }

    /// Current domain tables snapshot
    #[must_use]
    pub fn domain_snapshot(&self) -> Arc<DomainTables> {
        self.domain.snapshot()
    }

    /// Lifecycle events the sink accepted
    #[must_use]
    pub fn events_emitted(&self) -> u64 {
        self.emitter.emitted()
    }

    /// Lifecycle events the sink refused
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.emitter.dropped()
    }

    /// The configuration the engine was built with
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Claim the fingerprint, resolving duplicates per the dedup policy
    fn admit(
        &self,
        fingerprint: &Fingerprint,
        deadline: &Deadline,
        start: Instant,
    ) -> Result<Admitted<'_>> {
        loop {
            deadline.check()?;
            match self.guard.try_begin(fingerprint) {
                Admission::Admitted(permit) => return Ok(Admitted::Permit(permit)),
                Admission::AtCapacity => {
                    return Err(ExplicarError::AlreadyInProgress {
                        fingerprint: fingerprint.digest(),
                    });
                }
                Admission::Duplicate => match self.config.concurrency.dedup_policy {
                    DedupPolicy::FailFast => {
                        return Err(ExplicarError::AlreadyInProgress {
                            fingerprint: fingerprint.digest(),
                        });
                    }
                    DedupPolicy::Block => {
                        self.guard.wait_until_clear(fingerprint, deadline.remaining());
                        if let Some(record) = self.cache.get(fingerprint) {
                            return Ok(Admitted::Cached(self.serve_cached(record, start)));
                        }
                        // The winner failed or its record expired; compete again
                    }
                },
            }
        }
    }

    /// Serve a cached record, counting it as a successful run
    #[allow(clippy::cast_possible_truncation)]
    fn serve_cached(&self, record: ExplanationRecord, start: Instant) -> ExplanationRecord {
        let elapsed = start.elapsed();
        let record = record.as_cache_hit(elapsed.as_millis() as u64);
        self.metrics.record_success(elapsed, true);
        self.emitter.emit(LifecycleEvent::Completed {
            explanation_id: record.id.clone(),
            prediction_id: record.prediction_id.clone(),
            elapsed_ms: record.performance.elapsed_ms,
            confidence: record.confidence(),
            cache_hit: true,
        });
        record
    }

    /// Run the sub-engines and assemble the record
    #[allow(clippy::cast_possible_truncation)]
    fn run_pipeline(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
        deadline: &Deadline,
        explanation_id: &str,
        start: Instant,
    ) -> Result<ExplanationRecord> {
        let tables = self.domain.snapshot();

        // Attribution and the surrogate fit are independent of each other
        let (attribution, surrogate) = rayon::join(
            || self.attribution.compute(input, predicted_value, &tables),
            || {
                self.surrogate
                    .compute(input, predicted_value, self.predictor.as_ref(), deadline)
            },
        );
        let surrogate = surrogate?;
        deadline.check()?;

        let narrative = self
            .narrative
            .generate(input, predicted_value, &attribution, &surrogate);
        let visualizations =
            self.visualization
                .build(input, predicted_value, &attribution, &surrogate, &tables);
        deadline.check()?;

        let confidence = confidence_level(attribution.top_importance(), surrogate.fidelity);
        Ok(ExplanationRecord {
            id: explanation_id.to_string(),
            prediction_id: input.prediction_id.clone(),
            entity_class: input.entity_class.clone(),
            model_id: input.model_id.clone(),
            predicted_value,
            interval: PredictionInterval::around(predicted_value, surrogate.prediction_band),
            attribution,
            surrogate,
            narrative,
            visualizations,
            performance: PerformanceBlock {
                elapsed_ms: start.elapsed().as_millis() as u64,
                cache_hit: false,
                confidence,
            },
            created_at: Utc::now(),
        })
    }
}

/// Outcome of admission: a permit to compute, or a record that appeared
/// while waiting under the block policy
enum Admitted<'a> {
    Permit(InFlightPermit<'a>),
    Cached(ExplanationRecord),
}
