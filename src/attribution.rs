//! SHAP-style feature attribution
//!
//! Decomposes a scalar prediction into additive per-feature contributions
//! using the domain knowledge tables: each feature contributes
//! `(value - reference) x weight x situational multiplier`. Contributions
//! are ranked, truncated, and then normalized so that
//! `baseline + sum(contributions)` lands exactly on the predicted value.
//! The residual is spread uniformly across the kept features, the same
//! correction kernel SHAP applies to close its additivity gap.
//!
//! ## Features
//!
//! - Deterministic ranking: importance descending, feature name ascending
//! - Additivity enforced by a final normalization pass, never left to chance
//! - Pairwise interaction discovery among the top-ranked features
//! - Per-class global importance table from normalized weight shares
//!
//! ## Example
//!
//! ```rust
//! use explicar::attribution::{AttributionConfig, AttributionEngine};
//! use explicar::domain::{ClassProfile, DomainTables};
//! use explicar::input::PredictionInput;
//!
//! let tables = DomainTables::default().with_class(
//!     "quarterback",
//!     ClassProfile::new(250.0).with_feature("passing_yards", 250.0, 0.08),
//! );
//! let engine = AttributionEngine::new(AttributionConfig::default());
//! let input = PredictionInput::new("p1", "quarterback", "model-v1")
//!     .with_feature("passing_yards", 300.0);
//!
//! let result = engine.compute(&input, 254.0, &tables);
//! let total: f64 = result.contributions.iter().map(|c| c.contribution).sum();
//! assert!((result.baseline + total - 254.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::DomainTables;
use crate::input::PredictionInput;

/// Interactions are computed among this many top-ranked features
const TOP_INTERACTION_FEATURES: usize = 5;
/// At most this many interactions are returned
const MAX_INTERACTIONS: usize = 3;
/// Interactions weaker than this magnitude are dropped
const MIN_INTERACTION_SCORE: f64 = 0.1;

/// Approximation strategy for the attribution computation
///
/// `Exact` and `Tree` are accepted for configuration compatibility and
/// currently share the kernel-style weighted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproximationMode {
    /// Full enumeration (dispatches to the kernel path)
    Exact,
    /// Kernel-weighted additive decomposition
    #[default]
    Kernel,
    /// Tree-structure shortcut (dispatches to the kernel path)
    Tree,
}

/// Configuration for the attribution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// When false, `compute` returns an empty result carrying only the baseline
    pub enabled: bool,
    /// Keep at most this many ranked contributions; 0 keeps all
    pub max_features: usize,
    /// Reserved for sampling-based approximation modes
    pub background_samples: usize,
    /// Approximation strategy
    pub approximation_mode: ApproximationMode,
    /// Scale constant applied to every pairwise interaction score
    pub interaction_scale: f64,
    /// Additive bonus for feature pairs sharing a name prefix
    pub same_domain_bonus: f64,
    /// Additive penalty for feature pairs from competing domains
    pub competing_penalty: f64,
    /// Unordered prefix pairs treated as competing domains
    pub competing_domains: Vec<(String, String)>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_features: 10,
            background_samples: 100,
            approximation_mode: ApproximationMode::default(),
            interaction_scale: 0.01,
            same_domain_bonus: 0.25,
            competing_penalty: 0.25,
            competing_domains: Vec::new(),
        }
    }
}

/// One feature's share of the prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    /// Feature name
    pub feature: String,
    /// Observed feature value
    pub value: f64,
    /// Signed contribution to the prediction
    pub contribution: f64,
    /// Magnitude of the contribution
    pub importance: f64,
    /// 1-based rank, 1 is the most important
    pub rank: usize,
}

/// Interaction effect between two features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInteraction {
    /// First feature of the pair
    pub feature_a: String,
    /// Second feature of the pair
    pub feature_b: String,
    /// Signed interaction strength
    pub score: f64,
}

/// Class-level importance share of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImportance {
    /// Feature name
    pub feature: String,
    /// Normalized share of the class weight mass, in [0, 1]
    pub share: f64,
}

/// Complete attribution output for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Class baseline the contributions build on
    pub baseline: f64,
    /// Ranked feature contributions, rank 1 first
    pub contributions: Vec<FeatureContribution>,
    /// Strongest pairwise interactions, by magnitude
    pub interactions: Vec<FeatureInteraction>,
    /// Class-level importance shares, largest first
    pub global_importance: Vec<GlobalImportance>,
}

impl AttributionResult {
    /// Result carrying only the baseline, used when attribution is disabled
    #[must_use]
    pub fn empty(baseline: f64) -> Self {
        Self {
            baseline,
            contributions: Vec::new(),
            interactions: Vec::new(),
            global_importance: Vec::new(),
        }
    }

    /// Contribution of the top-ranked feature, 0.0 when there is none
    #[must_use]
    pub fn top_importance(&self) -> f64 {
        self.contributions.first().map_or(0.0, |c| c.importance)
    }
}

/// Computes additive feature attributions from domain knowledge
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    config: AttributionConfig,
}

impl AttributionEngine {
    /// Create an engine with the given configuration
    #[must_use]
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    /// Attribute `predicted_value` to the input's features
    ///
    /// Works on the class feature subset when the class is known, falling
    /// back to all supplied features otherwise. The returned contributions
    /// satisfy `baseline + sum = predicted_value` exactly.
    #[must_use]
    pub fn compute(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
        tables: &DomainTables,
    ) -> AttributionResult {
        let baseline = tables.baseline(&input.entity_class);
        if !self.config.enabled {
            return AttributionResult::empty(baseline);
        }

        let scored = self.scored_features(input, tables);
        let mut contributions: Vec<FeatureContribution> = scored
            .iter()
            .map(|(name, value)| {
                let reference = tables.feature_baseline(&input.entity_class, name);
                let weight = tables.weight(&input.entity_class, name);
                let multiplier = tables.situational_multiplier(name, &input.context);
                let contribution = (value - reference) * weight * multiplier;
                FeatureContribution {
                    feature: name.clone(),
                    value: *value,
                    contribution,
                    importance: contribution.abs(),
                    rank: 0,
                }
            })
            .collect();

        rank(&mut contributions);
        if self.config.max_features > 0 {
            contributions.truncate(self.config.max_features);
        }
        normalize_additive(&mut contributions, baseline, predicted_value);

        let interactions = self.interactions(&contributions, tables);
        let global_importance = global_importance(&input.entity_class, &scored, tables);

        AttributionResult {
            baseline,
            contributions,
            interactions,
            global_importance,
        }
    }

    /// Feature names and values to score: the class subset when known and
    /// present in the input, otherwise every supplied feature
    fn scored_features(
        &self,
        input: &PredictionInput,
        tables: &DomainTables,
    ) -> Vec<(String, f64)> {
        if let Some(class_features) = tables.class_features(&input.entity_class) {
            let subset: Vec<(String, f64)> = class_features
                .into_iter()
                .filter_map(|name| input.features.get(&name).map(|v| (name, *v)))
                .collect();
            if !subset.is_empty() {
                return subset;
            }
        }
        input
            .features
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    /// Pairwise interactions among the top-ranked contributions
    fn interactions(
        &self,
        contributions: &[FeatureContribution],
        tables: &DomainTables,
    ) -> Vec<FeatureInteraction> {
        let top = &contributions[..contributions.len().min(TOP_INTERACTION_FEATURES)];
        let mut found = Vec::new();

        for (i, a) in top.iter().enumerate() {
            for b in &top[i + 1..] {
                let correlation = tables.correlation(&a.feature, &b.feature);
                // Magnitude from the values, sign from the correlation
                let mut score =
                    correlation * (a.value * b.value).abs().sqrt() * self.config.interaction_scale;
                score += self.pattern_adjustment(&a.feature, &b.feature);
                if score.abs() > MIN_INTERACTION_SCORE {
                    found.push(FeatureInteraction {
                        feature_a: a.feature.clone(),
                        feature_b: b.feature.clone(),
                        score,
                    });
                }
            }
        }

        found.sort_by(|x, y| y.score.abs().total_cmp(&x.score.abs()));
        found.truncate(MAX_INTERACTIONS);
        found
    }

    /// Name-pattern bonus or penalty for a feature pair
    fn pattern_adjustment(&self, a: &str, b: &str) -> f64 {
        let (Some(prefix_a), Some(prefix_b)) = (domain_prefix(a), domain_prefix(b)) else {
            return 0.0;
        };
        if prefix_a == prefix_b {
            return self.config.same_domain_bonus;
        }
        let competing = self.config.competing_domains.iter().any(|(x, y)| {
            (x == prefix_a && y == prefix_b) || (x == prefix_b && y == prefix_a)
        });
        if competing {
            -self.config.competing_penalty
        } else {
            0.0
        }
    }
}

/// Part of the name before the first underscore, `None` for flat names
fn domain_prefix(name: &str) -> Option<&str> {
    name.split_once('_').map(|(prefix, _)| prefix)
}

/// Sort by importance descending with name-ascending tie-break, ranks 1..k
fn rank(contributions: &mut [FeatureContribution]) {
    contributions.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    for (index, entry) in contributions.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
}

/// Spread the additivity residual uniformly over the kept features, then
/// re-rank by the corrected magnitudes
fn normalize_additive(
    contributions: &mut [FeatureContribution],
    baseline: f64,
    predicted_value: f64,
) {
    if contributions.is_empty() {
        return;
    }
    let total: f64 = contributions.iter().map(|c| c.contribution).sum();
    let residual = predicted_value - baseline - total;
    let adjustment = residual / contributions.len() as f64;
    for entry in contributions.iter_mut() {
        entry.contribution += adjustment;
        entry.importance = entry.contribution.abs();
    }
    rank(contributions);
}

/// Normalized weight shares over the scored feature set
fn global_importance(
    class: &str,
    scored: &[(String, f64)],
    tables: &DomainTables,
) -> Vec<GlobalImportance> {
    let names: Vec<&String> = scored.iter().map(|(name, _)| name).collect();
    let total: f64 = names.iter().map(|n| tables.weight(class, n).abs()).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut shares: Vec<GlobalImportance> = names
        .iter()
        .map(|name| GlobalImportance {
            feature: (*name).clone(),
            share: tables.weight(class, name).abs() / total,
        })
        .collect();
    shares.sort_by(|a, b| {
        b.share
            .total_cmp(&a.share)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    shares
}
