//! Explanation record assembly
//!
//! The record is the engine's unit of output and the unit the cache stores:
//! one prediction's attribution, surrogate fit, narrative, and charts under
//! a single id, stamped with timing and confidence. Records are immutable
//! once assembled; a cache hit hands back a copy with only the performance
//! block rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionResult;
use crate::narrative::NarrativeResult;
use crate::surrogate::SurrogateResult;
use crate::viz::ChartPayload;

/// Closed interval around a point estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    /// Lower bound
    pub low: f64,
    /// Upper bound
    pub high: f64,
}

impl PredictionInterval {
    /// Interval centered on `value` with the given half-width
    ///
    /// A negative half-width collapses to the degenerate point interval.
    #[must_use]
    pub fn around(value: f64, half_width: f64) -> Self {
        let half = half_width.max(0.0);
        Self {
            low: value - half,
            high: value + half,
        }
    }

    /// Whether `value` falls inside the interval
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// Width of the interval
    #[must_use]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Timing and provenance for one explanation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBlock {
    /// Wall-clock time the run took, in milliseconds
    pub elapsed_ms: u64,
    /// True when the record was served from the cache
    pub cache_hit: bool,
    /// Overall confidence in the explanation, in [0, 1]
    pub confidence: f64,
}

/// Complete explanation for a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRecord {
    /// Unique id of this explanation
    pub id: String,
    /// Id of the prediction being explained
    pub prediction_id: String,
    /// Entity class the prediction belongs to
    pub entity_class: String,
    /// Model that produced the prediction
    pub model_id: String,
    /// The predicted value the explanation accounts for
    pub predicted_value: f64,
    /// Uncertainty interval around the predicted value
    pub interval: PredictionInterval,
    /// Feature contribution breakdown
    pub attribution: AttributionResult,
    /// Local surrogate fit
    pub surrogate: SurrogateResult,
    /// Human-readable narrative
    pub narrative: NarrativeResult,
    /// Chart payloads ready for rendering
    pub visualizations: Vec<ChartPayload>,
    /// Timing and confidence for this run
    pub performance: PerformanceBlock,
    /// When the record was assembled
    pub created_at: DateTime<Utc>,
}

impl ExplanationRecord {
    /// Overall confidence carried in the performance block
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.performance.confidence
    }

    /// True when the record was served from the cache
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        self.performance.cache_hit
    }

    /// Copy of the record re-stamped as a cache hit
    ///
    /// The explanation content and its original id are preserved; only the
    /// performance block reflects the lookup instead of the computation.
    #[must_use]
    pub fn as_cache_hit(&self, elapsed_ms: u64) -> Self {
        let mut copy = self.clone();
        copy.performance.cache_hit = true;
        copy.performance.elapsed_ms = elapsed_ms;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::NarrativeResult;
    use crate::surrogate::SurrogateResult;

    fn sample_record() -> ExplanationRecord {
        ExplanationRecord {
            id: "exp-1".to_string(),
            prediction_id: "pred-1".to_string(),
            entity_class: "quarterback".to_string(),
            model_id: "model-v1".to_string(),
            predicted_value: 275.0,
            interval: PredictionInterval::around(275.0, 10.0),
            attribution: AttributionResult::empty(250.0),
            surrogate: SurrogateResult::disabled(),
            narrative: NarrativeResult::empty(),
            visualizations: Vec::new(),
            performance: PerformanceBlock {
                elapsed_ms: 42,
                cache_hit: false,
                confidence: 0.75,
            },
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // Intervals
    // ========================================================================

    #[test]
    fn test_interval_around_is_symmetric() {
        let interval = PredictionInterval::around(100.0, 5.0);
        assert!((interval.low - 95.0).abs() < 1e-12);
        assert!((interval.high - 105.0).abs() < 1e-12);
        assert!((interval.width() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_interval_negative_half_width_collapses() {
        let interval = PredictionInterval::around(100.0, -3.0);
        assert_eq!(interval.low, 100.0);
        assert_eq!(interval.high, 100.0);
        assert!(interval.contains(100.0));
    }

    #[test]
    fn test_interval_contains_bounds() {
        let interval = PredictionInterval::around(0.0, 1.0);
        assert!(interval.contains(-1.0));
        assert!(interval.contains(1.0));
        assert!(!interval.contains(1.0001));
    }

    // ========================================================================
    // Cache-hit re-stamping
    // ========================================================================

    #[test]
    fn test_as_cache_hit_rewrites_only_performance() {
        let record = sample_record();
        let hit = record.as_cache_hit(1);

        assert!(hit.is_cache_hit());
        assert_eq!(hit.performance.elapsed_ms, 1);
        assert_eq!(hit.id, record.id);
        assert_eq!(hit.prediction_id, record.prediction_id);
        assert_eq!(hit.predicted_value, record.predicted_value);
        assert_eq!(hit.confidence(), record.confidence());
        assert_eq!(hit.attribution, record.attribution);
        assert_eq!(hit.created_at, record.created_at);
    }

    #[test]
    fn test_fresh_record_is_not_cache_hit() {
        assert!(!sample_record().is_cache_hit());
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[test]
    fn test_record_serde_round_trip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: ExplanationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_json_exposes_interval_bounds() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(json["interval"]["low"], 265.0);
        assert_eq!(json["interval"]["high"], 285.0);
        assert_eq!(json["performance"]["cache_hit"], false);
    }
}
