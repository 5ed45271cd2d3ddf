//! Domain knowledge tables for attribution
//!
//! Holds the per-class baselines, feature weights, pairwise correlations,
//! and situational adjustment rules that drive the attribution formula.
//! Every lookup is a total function: unknown classes, features, pairs, and
//! contexts resolve to documented defaults instead of errors, so a request
//! for an unconfigured entity class still produces a complete explanation.
//!
//! ## Features
//!
//! - Thread-safe provider with lock-free snapshot reads via `ArcSwap`
//! - Wholesale `reload` and single-class `upsert` between requests
//! - Serde-loadable tables for JSON-file configuration
//!
//! ## Example
//!
//! ```rust
//! use explicar::domain::{ClassProfile, DomainTables};
//!
//! let tables = DomainTables::default()
//!     .with_class(
//!         "quarterback",
//!         ClassProfile::new(250.0).with_feature("passing_yards", 250.0, 0.08),
//!     )
//!     .with_correlation("passing_yards", "completions", 0.85);
//!
//! assert_eq!(tables.weight("quarterback", "passing_yards"), 0.08);
//! assert_eq!(tables.weight("quarterback", "unlisted"), 0.1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::input::PredictionContext;
use crate::ExplicarError;

/// Weight applied to features with no configured weight
pub const DEFAULT_WEIGHT: f64 = 0.1;

/// Per-class knowledge used by the attribution formula
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassProfile {
    /// Expected prediction for an average member of the class
    pub baseline: f64,
    /// Reference value per feature; the formula subtracts this from the observed value
    #[serde(default)]
    pub feature_baselines: BTreeMap<String, f64>,
    /// Relative importance per feature
    #[serde(default)]
    pub feature_weights: BTreeMap<String, f64>,
}

impl ClassProfile {
    /// Create a profile with the given prediction baseline and no features
    #[must_use]
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline,
            feature_baselines: BTreeMap::new(),
            feature_weights: BTreeMap::new(),
        }
    }

    /// Add a feature with its reference value and weight
    #[must_use]
    pub fn with_feature(mut self, name: &str, baseline: f64, weight: f64) -> Self {
        self.feature_baselines.insert(name.to_string(), baseline);
        self.feature_weights.insert(name.to_string(), weight);
        self
    }
}

/// Symmetric pairwise correlation between two features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    /// First feature of the pair
    pub feature_a: String,
    /// Second feature of the pair
    pub feature_b: String,
    /// Correlation value, expected in [-1, 1]
    pub value: f64,
}

/// Context-conditional multiplier rule
///
/// A rule fires when the request context carries `context_key` with a value
/// equal to `context_value` (ASCII case-insensitive). When `feature_pattern`
/// is set, the rule only applies to features whose name contains the
/// pattern; otherwise it applies to every feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationalRule {
    /// Substring filter on feature names; `None` matches all features
    #[serde(default)]
    pub feature_pattern: Option<String>,
    /// Context attribute that triggers the rule
    pub context_key: String,
    /// Context attribute value that triggers the rule
    pub context_value: String,
    /// Multiplier applied to matching contributions
    pub multiplier: f64,
}

impl SituationalRule {
    /// Create a rule that applies to all features
    #[must_use]
    pub fn new(context_key: &str, context_value: &str, multiplier: f64) -> Self {
        Self {
            feature_pattern: None,
            context_key: context_key.to_string(),
            context_value: context_value.to_string(),
            multiplier,
        }
    }

    /// Restrict the rule to features whose name contains `pattern`
    #[must_use]
    pub fn for_features(mut self, pattern: &str) -> Self {
        self.feature_pattern = Some(pattern.to_string());
        self
    }

    fn matches(&self, feature: &str, context: &PredictionContext) -> bool {
        if let Some(pattern) = &self.feature_pattern {
            if !feature.contains(pattern.as_str()) {
                return false;
            }
        }
        context
            .attributes
            .get(&self.context_key)
            .is_some_and(|v| v.eq_ignore_ascii_case(&self.context_value))
    }
}

/// Immutable snapshot of all domain knowledge tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainTables {
    /// Per-class profiles keyed by entity class
    #[serde(default)]
    pub classes: BTreeMap<String, ClassProfile>,
    /// Pairwise feature correlations
    #[serde(default)]
    pub correlations: Vec<CorrelationEntry>,
    /// Situational adjustment rules
    #[serde(default)]
    pub rules: Vec<SituationalRule>,
}

impl DomainTables {
    /// Parse tables from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the document does not deserialize.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExplicarError::InvalidInput {
            reason: format!("domain tables JSON: {e}"),
        })
    }

    /// Add or replace a class profile
    #[must_use]
    pub fn with_class(mut self, class: &str, profile: ClassProfile) -> Self {
        self.classes.insert(class.to_string(), profile);
        self
    }

    /// Add a symmetric correlation entry
    #[must_use]
    pub fn with_correlation(mut self, a: &str, b: &str, value: f64) -> Self {
        self.correlations.push(CorrelationEntry {
            feature_a: a.to_string(),
            feature_b: b.to_string(),
            value,
        });
        self
    }

    /// Add a situational rule
    #[must_use]
    pub fn with_rule(mut self, rule: SituationalRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Prediction baseline for a class, 0.0 for unknown classes
    #[must_use]
    pub fn baseline(&self, class: &str) -> f64 {
        self.classes.get(class).map_or(0.0, |p| p.baseline)
    }

    /// Reference value for a feature within a class, 0.0 when unconfigured
    #[must_use]
    pub fn feature_baseline(&self, class: &str, feature: &str) -> f64 {
        self.classes
            .get(class)
            .and_then(|p| p.feature_baselines.get(feature))
            .copied()
            .unwrap_or(0.0)
    }

    /// Weight for a feature within a class, [`DEFAULT_WEIGHT`] when unconfigured
    #[must_use]
    pub fn weight(&self, class: &str, feature: &str) -> f64 {
        self.classes
            .get(class)
            .and_then(|p| p.feature_weights.get(feature))
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Pairwise correlation, order-independent
    ///
    /// A feature correlates 1.0 with itself; unknown pairs are 0.0.
    #[must_use]
    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.correlations
            .iter()
            .find(|e| {
                (e.feature_a == a && e.feature_b == b) || (e.feature_a == b && e.feature_b == a)
            })
            .map_or(0.0, |e| e.value)
    }

    /// Product of all rule multipliers matching this feature and context
    ///
    /// Returns 1.0 when no rule matches.
    #[must_use]
    pub fn situational_multiplier(&self, feature: &str, context: &PredictionContext) -> f64 {
        self.rules
            .iter()
            .filter(|r| r.matches(feature, context))
            .map(|r| r.multiplier)
            .product()
    }

    /// Sorted feature names known for a class, `None` for unknown classes
    #[must_use]
    pub fn class_features(&self, class: &str) -> Option<Vec<String>> {
        self.classes.get(class).map(|p| {
            p.feature_baselines
                .keys()
                .chain(p.feature_weights.keys())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }
}

/// Thread-safe domain knowledge provider
///
/// Readers take a lock-free snapshot for the duration of one computation,
/// so a reload between requests never changes tables mid-explanation.
/// Uses `ArcSwap` for lock-free reads with a write mutex serializing
/// read-modify-write updates.
pub struct DomainProvider {
    /// Current tables (lock-free reads via `ArcSwap`)
    tables: ArcSwap<DomainTables>,
    /// Write lock to serialize incremental modifications
    write_lock: Mutex<()>,
}

impl DomainProvider {
    /// Create a provider over the given tables
    #[must_use]
    pub fn new(tables: DomainTables) -> Self {
        Self {
            tables: ArcSwap::from_pointee(tables),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a provider with empty tables; every lookup yields defaults
    #[must_use]
    pub fn empty() -> Self {
        Self::new(DomainTables::default())
    }

    /// Current tables snapshot (lock-free)
    #[must_use]
    pub fn snapshot(&self) -> Arc<DomainTables> {
        self.tables.load_full()
    }

    /// Replace all tables atomically
    pub fn reload(&self, tables: DomainTables) {
        self.tables.store(Arc::new(tables));
    }

    /// Add or replace a single class profile without touching other tables
    pub fn upsert_class(&self, class: &str, profile: ClassProfile) {
        // The guard holds no data, so a poisoned lock is safe to reenter.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut updated = (**self.tables.load()).clone();
        updated.classes.insert(class.to_string(), profile);
        self.tables.store(Arc::new(updated));
    }
}

impl Default for DomainProvider {
    fn default() -> Self {
        Self::empty()
    }
}
