//! # Explicar
//!
//! Prediction explanation engine with attribution, local surrogates,
//! narratives, and chart payloads.
//!
//! Explicar (Spanish: "to explain") turns a model's prediction into an
//! explanation record: per-feature contributions against a domain baseline,
//! a local linear surrogate fitted around the input, a plain-language
//! narrative, and render-ready visualization payloads. Records are cached
//! by input fingerprint, duplicate requests are deduplicated in flight, and
//! every run lands in the metrics window that drives the health signal.
//!
//! ## Features
//!
//! - **Attribution**: Baseline-relative contributions with situational
//!   multipliers, pairwise interactions, and additive consistency
//! - **Local surrogate**: Kernel-weighted linear fit over Gaussian
//!   perturbations, with fidelity and confidence intervals
//! - **Narrative**: Summary, key factors, reasoning, risks, and
//!   opportunities derived from the quantitative results
//! - **Operational**: TTL cache, fingerprint dedup, cooperative deadlines,
//!   lifecycle events, and Prometheus-ready metrics
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use explicar::domain::{ClassProfile, DomainTables};
//! use explicar::surrogate::Predictor;
//! use explicar::{EngineConfig, ExplanationEngine, PredictionInput, Result};
//!
//! struct YardsModel;
//! impl Predictor for YardsModel {
//!     fn predict(
//!         &self,
//!         features: &BTreeMap<String, f64>,
//!         _: &explicar::input::PredictionContext,
//!     ) -> Result<f64> {
//!         Ok(250.0 + 0.25 * features.get("passing_yards").copied().unwrap_or(0.0))
//!     }
//! }
//!
//! let tables = DomainTables::default().with_class(
//!     "quarterback",
//!     ClassProfile::new(250.0).with_feature("passing_yards", 250.0, 0.08),
//! );
//! let engine = ExplanationEngine::new(EngineConfig::default(), tables, Arc::new(YardsModel));
//!
//! let input = PredictionInput::new("pred-1", "quarterback", "model-v1")
//!     .with_feature("passing_yards", 300.0);
//! let record = engine.explain(&input, 325.0).unwrap();
//!
//! assert_eq!(record.entity_class, "quarterback");
//! assert!(!record.attribution.contributions.is_empty());
//! assert!(engine.explain(&input, 325.0).unwrap().is_cache_hit());
//! ```
//!
//! ## Architecture
//!
//! The [`engine::ExplanationEngine`] orchestrates the sub-engines: it
//! validates input, consults the cache, claims the fingerprint, runs
//! [`attribution`] and [`surrogate`] side by side, then derives
//! [`narrative`] text and [`viz`] payloads before assembling the record.
//! Domain knowledge lives in hot-reloadable [`domain`] tables shared across
//! runs via snapshots.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)] // u64 -> i64 for timestamps is safe
#![allow(clippy::cast_precision_loss)] // usize -> f64 precision loss is acceptable
#![allow(clippy::cast_possible_truncation)] // u128 -> u64 etc for metrics is safe
#![allow(clippy::cast_sign_loss)] // Metrics conversions are safe
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::single_match_else)] // Sometimes clearer than if-let
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::if_not_else)] // Allow if !condition { } else { }
#![allow(clippy::float_cmp)] // Allow float comparisons in tests
#![allow(clippy::cast_lossless)] // Allow i32 to f64 casts
#![allow(clippy::manual_range_contains)] // Allow manual range checks

/// Feature attribution against per-class domain baselines
///
/// Contribution = (value - baseline) x weight x situational multiplier,
/// rescaled so the baseline plus all contributions reproduces the
/// prediction. Includes pairwise interaction scoring among the top
/// features and global importance shares.
pub mod attribution;
pub mod cache;
/// Domain knowledge tables: class profiles, correlations, situational rules
///
/// Tables are immutable snapshots behind an `ArcSwap`; a reload swaps the
/// whole table set atomically while in-flight runs keep the snapshot they
/// started with.
pub mod domain;
/// Explanation orchestration: cache, dedup, deadline, assembly
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod input;
pub mod metrics;
/// Plain-language narrative generation from quantitative results
pub mod narrative;
pub mod record;
/// Local surrogate fitting via kernel-weighted linear regression
///
/// Gaussian perturbations around the input are scored through the caller's
/// [`surrogate::Predictor`] and fitted with weighted least squares. The
/// fit carries fidelity, an R-squared score, and per-coefficient
/// confidence intervals.
pub mod surrogate;
pub mod viz;

// Re-exports for convenience
pub use engine::{EngineConfig, ExplanationEngine};
pub use error::{ExplicarError, Result};
pub use input::PredictionInput;
pub use record::ExplanationRecord;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
