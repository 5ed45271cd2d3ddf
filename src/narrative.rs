//! Natural-language reasoning over attribution and surrogate outputs
//!
//! Turns the numeric explanation into structured reasoning entries, a
//! one-sentence summary, risk and opportunity callouts, and an aggregate
//! confidence score. Situational attributes flow in through the
//! [`ContextAnalyzer`] seam so domain packs can contribute their own
//! reasoning without touching the generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribution::AttributionResult;
use crate::input::{PredictionContext, PredictionInput};
use crate::surrogate::SurrogateResult;

/// Direction of a factor's influence on the prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    /// The factor pushes the prediction up
    Positive,
    /// The factor pushes the prediction down
    Negative,
}

/// Strength bucket of a factor's influence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    /// Minor influence
    Low,
    /// Notable influence
    Medium,
    /// Dominant influence
    High,
}

/// Bucketed aggregate confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    /// Below 0.6
    Low,
    /// At least 0.6, below 0.8
    Medium,
    /// 0.8 and above
    High,
}

impl ConfidenceBucket {
    /// Bucket a confidence level at the 0.6 and 0.8 boundaries
    #[must_use]
    pub fn from_level(level: f64) -> Self {
        if level >= 0.8 {
            Self::High
        } else if level >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One structured reasoning statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEntry {
    /// Factor the statement is about, usually a feature name
    pub factor: String,
    /// Direction of influence
    pub impact: Impact,
    /// Strength bucket
    pub strength: Strength,
    /// Human-readable explanation
    pub explanation: String,
}

/// Complete narrative output for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeResult {
    /// One-sentence summary referencing the outlook and leading factors
    pub summary: String,
    /// Feature names of the leading factors, strongest first
    pub key_factors: Vec<String>,
    /// Structured reasoning entries, attribution factors first
    pub reasoning: Vec<ReasoningEntry>,
    /// Aggregate confidence in [0, 1]
    pub confidence_level: f64,
    /// Bucketed confidence
    pub confidence: ConfidenceBucket,
    /// Conditions working against the prediction
    pub risks: Vec<String>,
    /// Conditions supporting additional upside
    pub opportunities: Vec<String>,
}

impl NarrativeResult {
    /// Empty narrative used when the generator is disabled
    #[must_use]
    pub fn empty() -> Self {
        Self {
            summary: String::new(),
            key_factors: Vec::new(),
            reasoning: Vec::new(),
            confidence_level: 0.0,
            confidence: ConfidenceBucket::Low,
            risks: Vec::new(),
            opportunities: Vec::new(),
        }
    }
}

/// Converts situational attributes into reasoning entries and risk flags
pub trait ContextAnalyzer: Send + Sync {
    /// Reasoning entries derived from the context
    fn analyze(&self, context: &PredictionContext) -> Vec<ReasoningEntry>;

    /// Non-nominal status flags worth surfacing as risks
    fn risk_flags(&self, context: &PredictionContext) -> Vec<String>;
}

/// Default analyzer understanding venue and weather attributes
///
/// Venue "home" reads as a positive, "away" as a negative. Adverse weather
/// (rain, snow, wind, storm) reads as a medium negative; clear or indoor
/// conditions as a low positive. Status-like attributes that are not
/// nominal become risk flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SituationalContextAnalyzer;

impl ContextAnalyzer for SituationalContextAnalyzer {
    fn analyze(&self, context: &PredictionContext) -> Vec<ReasoningEntry> {
        let mut entries = Vec::new();

        if let Some(venue) = context.attributes.get("venue") {
            match venue.to_ascii_lowercase().as_str() {
                "home" => entries.push(ReasoningEntry {
                    factor: "venue".to_string(),
                    impact: Impact::Positive,
                    strength: Strength::Low,
                    explanation: "Playing at the home venue".to_string(),
                }),
                "away" => entries.push(ReasoningEntry {
                    factor: "venue".to_string(),
                    impact: Impact::Negative,
                    strength: Strength::Low,
                    explanation: "Playing on the road".to_string(),
                }),
                _ => {}
            }
        }

        if let Some(weather) = context.attributes.get("weather") {
            let condition = weather.to_ascii_lowercase();
            let adverse = ["rain", "snow", "wind", "storm"];
            let benign = ["clear", "dome", "indoor"];
            if adverse.iter().any(|w| condition.contains(w)) {
                entries.push(ReasoningEntry {
                    factor: "weather".to_string(),
                    impact: Impact::Negative,
                    strength: Strength::Medium,
                    explanation: format!("Adverse weather conditions ({condition})"),
                });
            } else if benign.iter().any(|w| condition.contains(w)) {
                entries.push(ReasoningEntry {
                    factor: "weather".to_string(),
                    impact: Impact::Positive,
                    strength: Strength::Low,
                    explanation: format!("Favorable conditions ({condition})"),
                });
            }
        }

        entries
    }

    fn risk_flags(&self, context: &PredictionContext) -> Vec<String> {
        const NOMINAL: [&str; 5] = ["healthy", "active", "available", "nominal", "ok"];

        let mut flags = Vec::new();
        for key in ["status", "health", "availability"] {
            if let Some(value) = context.attributes.get(key) {
                if !NOMINAL.contains(&value.to_ascii_lowercase().as_str()) {
                    flags.push(format!("Entity {key} is {value}"));
                }
            }
        }
        flags
    }
}

/// Configuration for the narrative generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// When false, `generate` returns an empty narrative
    pub enabled: bool,
    /// Contributions above this magnitude read as high strength
    pub high_threshold: f64,
    /// Contributions above this magnitude read as medium strength
    pub medium_threshold: f64,
    /// Factor-name substrings that mark volume-driven opportunities
    pub volume_patterns: Vec<String>,
    /// Per-feature explanation templates with `{value}` and `{contribution}` placeholders
    pub templates: BTreeMap<String, String>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_threshold: 3.0,
            medium_threshold: 1.0,
            volume_patterns: vec![
                "attempts".to_string(),
                "volume".to_string(),
                "usage".to_string(),
            ],
            templates: BTreeMap::new(),
        }
    }
}

impl NarrativeConfig {
    /// Register an explanation template for one feature
    #[must_use]
    pub fn with_template(mut self, feature: &str, template: &str) -> Self {
        self.templates.insert(feature.to_string(), template.to_string());
        self
    }
}

/// Generates structured narratives from explanation outputs
pub struct NarrativeGenerator {
    config: NarrativeConfig,
    analyzer: Box<dyn ContextAnalyzer>,
}

impl NarrativeGenerator {
    /// Create a generator with the default situational analyzer
    #[must_use]
    pub fn new(config: NarrativeConfig) -> Self {
        Self {
            config,
            analyzer: Box::new(SituationalContextAnalyzer),
        }
    }

    /// Replace the context analyzer
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Box<dyn ContextAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Generate the narrative for one explained prediction
    #[must_use]
    pub fn generate(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
        attribution: &AttributionResult,
        surrogate: &SurrogateResult,
    ) -> NarrativeResult {
        if !self.config.enabled {
            return NarrativeResult::empty();
        }

        let mut reasoning: Vec<ReasoningEntry> = attribution
            .contributions
            .iter()
            .take(3)
            .map(|c| ReasoningEntry {
                factor: c.feature.clone(),
                impact: if c.contribution >= 0.0 {
                    Impact::Positive
                } else {
                    Impact::Negative
                },
                strength: self.strength_for(c.importance),
                explanation: self.explain_feature(&c.feature, c.value, c.contribution),
            })
            .collect();
        let key_factors: Vec<String> = reasoning.iter().map(|e| e.factor.clone()).collect();
        reasoning.extend(self.analyzer.analyze(&input.context));

        let positives = reasoning.iter().filter(|e| e.impact == Impact::Positive).count();
        let negatives = reasoning.len() - positives;
        let outlook = match positives.cmp(&negatives) {
            std::cmp::Ordering::Greater => "favorable",
            std::cmp::Ordering::Less => "challenging",
            std::cmp::Ordering::Equal => "neutral",
        };
        let summary = summarize(predicted_value, outlook, &key_factors);

        let risks = self.collect_risks(input, &reasoning);
        let opportunities = self.collect_opportunities(&reasoning);

        let confidence_level = confidence_level(attribution.top_importance(), surrogate.fidelity);

        NarrativeResult {
            summary,
            key_factors,
            reasoning,
            confidence_level,
            confidence: ConfidenceBucket::from_level(confidence_level),
            risks,
            opportunities,
        }
    }

    fn strength_for(&self, importance: f64) -> Strength {
        if importance > self.config.high_threshold {
            Strength::High
        } else if importance > self.config.medium_threshold {
            Strength::Medium
        } else {
            Strength::Low
        }
    }

    /// Template-based explanation with a generic fallback
    fn explain_feature(&self, feature: &str, value: f64, contribution: f64) -> String {
        if let Some(template) = self.config.templates.get(feature) {
            return template
                .replace("{value}", &format!("{value:.1}"))
                .replace("{contribution}", &format!("{contribution:+.1}"));
        }
        let direction = if contribution >= 0.0 { "raised" } else { "lowered" };
        format!(
            "{} of {value:.1} {direction} the prediction by {:.1}",
            humanize(feature),
            contribution.abs()
        )
    }

    fn collect_risks(&self, input: &PredictionInput, reasoning: &[ReasoningEntry]) -> Vec<String> {
        let mut risks = self.analyzer.risk_flags(&input.context);
        let strong_negatives = reasoning
            .iter()
            .filter(|e| e.impact == Impact::Negative && e.strength == Strength::High)
            .count();
        if strong_negatives >= 2 {
            risks.push(format!(
                "{strong_negatives} strong negative factors weigh on this prediction"
            ));
        }
        risks
    }

    fn collect_opportunities(&self, reasoning: &[ReasoningEntry]) -> Vec<String> {
        let mut opportunities = Vec::new();
        let strong_positives = reasoning
            .iter()
            .filter(|e| e.impact == Impact::Positive && e.strength == Strength::High)
            .count();
        if strong_positives >= 2 {
            opportunities.push(format!(
                "{strong_positives} strong positive factors align for this prediction"
            ));
        }
        for entry in reasoning {
            if entry.impact != Impact::Positive {
                continue;
            }
            let factor = entry.factor.to_ascii_lowercase();
            if self
                .config
                .volume_patterns
                .iter()
                .any(|p| factor.contains(&p.to_ascii_lowercase()))
            {
                opportunities.push(format!(
                    "High {} supports additional upside",
                    humanize(&entry.factor)
                ));
            }
        }
        opportunities
    }
}

impl Default for NarrativeGenerator {
    fn default() -> Self {
        Self::new(NarrativeConfig::default())
    }
}

/// Aggregate confidence from the strongest attribution and surrogate fit
///
/// `0.5 + min(top_importance / 10, 0.3) + fidelity * 0.2`, clamped to [0, 1].
#[must_use]
pub fn confidence_level(top_importance: f64, fidelity: f64) -> f64 {
    (0.5 + (top_importance / 10.0).min(0.3) + fidelity * 0.2).clamp(0.0, 1.0)
}

/// Feature names read better without underscores
fn humanize(name: &str) -> String {
    name.replace('_', " ")
}

fn summarize(predicted_value: f64, outlook: &str, key_factors: &[String]) -> String {
    match key_factors {
        [] => format!(
            "Prediction of {predicted_value:.1} carries a {outlook} outlook with no dominant factors."
        ),
        [only] => format!(
            "Prediction of {predicted_value:.1} carries a {outlook} outlook, led by {}.",
            humanize(only)
        ),
        [first, second, ..] => format!(
            "Prediction of {predicted_value:.1} carries a {outlook} outlook, led by {} and {}.",
            humanize(first),
            humanize(second)
        ),
    }
}
