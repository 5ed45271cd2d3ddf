//! Chart-ready visualization payloads
//!
//! Pure transforms from explanation outputs to serializable chart
//! descriptions: a waterfall from baseline to prediction, ranked importance
//! bars, surrogate coefficients as a scatter with confidence bands, and a
//! correlation heatmap over the class feature set. No rendering happens
//! here; consumers feed the payloads to whatever charting stack they use.

use serde::{Deserialize, Serialize};

use crate::attribution::AttributionResult;
use crate::domain::DomainTables;
use crate::input::PredictionInput;
use crate::surrogate::SurrogateResult;

/// Kind of chart a payload describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Baseline-to-prediction waterfall of contributions
    Waterfall,
    /// Feature importance bars ordered by rank
    RankedBars,
    /// Surrogate coefficients against feature values, with confidence bands
    Scatter,
    /// Pairwise correlation matrix over the class feature set
    Heatmap,
}

/// One step of a waterfall series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    /// Step label, a feature name or "baseline"/"prediction"
    pub label: String,
    /// Signed change this step applies
    pub delta: f64,
    /// Running total after this step
    pub running_total: f64,
}

/// One bar of a ranked importance series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedBar {
    /// Feature name
    pub feature: String,
    /// Contribution magnitude
    pub importance: f64,
    /// Signed contribution
    pub contribution: f64,
    /// Attribution rank, 1 first
    pub rank: usize,
}

/// One point of a surrogate scatter series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    /// Feature name
    pub feature: String,
    /// Observed feature value
    pub value: f64,
    /// Surrogate coefficient
    pub coefficient: f64,
    /// Half-width of the 95% confidence band
    pub band: f64,
}

/// Typed series data, one variant per chart kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartSeries {
    /// Waterfall steps in display order
    Waterfall {
        /// Steps from baseline to final prediction
        steps: Vec<WaterfallStep>,
    },
    /// Importance bars in rank order
    RankedBars {
        /// Bars, rank 1 first
        bars: Vec<RankedBar>,
    },
    /// Surrogate coefficient points
    Scatter {
        /// One point per surrogate feature
        points: Vec<ScatterPoint>,
    },
    /// Correlation matrix
    Heatmap {
        /// Feature names labeling both axes
        features: Vec<String>,
        /// Row-major correlation values, `values[i][j]` for features i and j
        values: Vec<Vec<f64>>,
    },
}

/// One chart-ready payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    /// Chart kind
    pub kind: ChartKind,
    /// Display title
    pub title: String,
    /// Typed series data
    pub series: ChartSeries,
    /// Horizontal axis label
    pub x_label: String,
    /// Vertical axis label
    pub y_label: String,
    /// One-line caption describing the chart
    pub caption: String,
}

/// Configuration for the visualization builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationConfig {
    /// When false, `build` returns no payloads
    pub enabled: bool,
    /// Charts to build, in output order
    pub chart_types: Vec<ChartKind>,
    /// Cap on data points per series; overflow collapses or truncates
    pub max_data_points: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chart_types: vec![
                ChartKind::Waterfall,
                ChartKind::RankedBars,
                ChartKind::Scatter,
                ChartKind::Heatmap,
            ],
            max_data_points: 50,
        }
    }
}

/// Builds chart payloads from explanation outputs
#[derive(Debug, Clone)]
pub struct VisualizationBuilder {
    config: VisualizationConfig,
}

impl VisualizationBuilder {
    /// Create a builder with the given configuration
    #[must_use]
    pub fn new(config: VisualizationConfig) -> Self {
        Self { config }
    }

    /// Build all configured charts for one explained prediction
    ///
    /// Charts whose series would be empty are skipped: no scatter without
    /// surrogate features, no heatmap for unknown classes or classes with
    /// fewer than two features.
    #[must_use]
    pub fn build(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
        attribution: &AttributionResult,
        surrogate: &SurrogateResult,
        tables: &DomainTables,
    ) -> Vec<ChartPayload> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut charts = Vec::new();
        for kind in &self.config.chart_types {
            let payload = match kind {
                ChartKind::Waterfall => Some(self.waterfall(predicted_value, attribution)),
                ChartKind::RankedBars => self.ranked_bars(attribution),
                ChartKind::Scatter => self.scatter(surrogate),
                ChartKind::Heatmap => self.heatmap(&input.entity_class, tables),
            };
            if let Some(chart) = payload {
                charts.push(chart);
            }
        }
        charts
    }

    /// Waterfall from baseline through contributions to the prediction
    ///
    /// Contributions beyond the point cap collapse into one "other factors"
    /// step so the running total still lands on the prediction.
    fn waterfall(&self, predicted_value: f64, attribution: &AttributionResult) -> ChartPayload {
        let mut steps = Vec::with_capacity(attribution.contributions.len() + 2);
        let mut running = attribution.baseline;
        steps.push(WaterfallStep {
            label: "baseline".to_string(),
            delta: attribution.baseline,
            running_total: running,
        });

        let cap = self.config.max_data_points;
        let (shown, collapsed) = if cap > 0 && attribution.contributions.len() > cap {
            attribution.contributions.split_at(cap)
        } else {
            (&attribution.contributions[..], &[][..])
        };
        for contribution in shown {
            running += contribution.contribution;
            steps.push(WaterfallStep {
                label: contribution.feature.clone(),
                delta: contribution.contribution,
                running_total: running,
            });
        }
        if !collapsed.is_empty() {
            let rest: f64 = collapsed.iter().map(|c| c.contribution).sum();
            running += rest;
            steps.push(WaterfallStep {
                label: "other factors".to_string(),
                delta: rest,
                running_total: running,
            });
        }

        // Nonzero only when attribution was disabled upstream
        let unexplained = predicted_value - running;
        steps.push(WaterfallStep {
            label: "prediction".to_string(),
            delta: unexplained,
            running_total: predicted_value,
        });

        ChartPayload {
            kind: ChartKind::Waterfall,
            title: "Prediction waterfall".to_string(),
            series: ChartSeries::Waterfall { steps },
            x_label: "factor".to_string(),
            y_label: "prediction".to_string(),
            caption: format!(
                "How each factor moves the prediction from {:.1} to {predicted_value:.1}",
                attribution.baseline
            ),
        }
    }

    fn ranked_bars(&self, attribution: &AttributionResult) -> Option<ChartPayload> {
        if attribution.contributions.is_empty() {
            return None;
        }
        let mut bars: Vec<RankedBar> = attribution
            .contributions
            .iter()
            .map(|c| RankedBar {
                feature: c.feature.clone(),
                importance: c.importance,
                contribution: c.contribution,
                rank: c.rank,
            })
            .collect();
        if self.config.max_data_points > 0 {
            bars.truncate(self.config.max_data_points);
        }

        Some(ChartPayload {
            kind: ChartKind::RankedBars,
            title: "Feature importance".to_string(),
            series: ChartSeries::RankedBars { bars },
            x_label: "feature".to_string(),
            y_label: "importance".to_string(),
            caption: "Features ordered by attribution rank".to_string(),
        })
    }

    fn scatter(&self, surrogate: &SurrogateResult) -> Option<ChartPayload> {
        if surrogate.features.is_empty() {
            return None;
        }
        let mut points: Vec<ScatterPoint> = surrogate
            .features
            .iter()
            .map(|f| ScatterPoint {
                feature: f.feature.clone(),
                value: f.value,
                coefficient: f.coefficient,
                band: f.confidence_interval,
            })
            .collect();
        if self.config.max_data_points > 0 {
            points.truncate(self.config.max_data_points);
        }

        Some(ChartPayload {
            kind: ChartKind::Scatter,
            title: "Surrogate coefficients".to_string(),
            series: ChartSeries::Scatter { points },
            x_label: "feature value".to_string(),
            y_label: "coefficient".to_string(),
            caption: "Local surrogate coefficients with 95% confidence bands".to_string(),
        })
    }

    fn heatmap(&self, entity_class: &str, tables: &DomainTables) -> Option<ChartPayload> {
        let mut features = tables.class_features(entity_class)?;
        if self.config.max_data_points > 0 {
            features.truncate(self.config.max_data_points);
        }
        if features.len() < 2 {
            return None;
        }

        let values: Vec<Vec<f64>> = features
            .iter()
            .map(|a| features.iter().map(|b| tables.correlation(a, b)).collect())
            .collect();

        Some(ChartPayload {
            kind: ChartKind::Heatmap,
            title: "Feature correlations".to_string(),
            series: ChartSeries::Heatmap { features, values },
            x_label: "feature".to_string(),
            y_label: "feature".to_string(),
            caption: format!("Pairwise correlations for class {entity_class}"),
        })
    }
}

impl Default for VisualizationBuilder {
    fn default() -> Self {
        Self::new(VisualizationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::FeatureContribution;
    use crate::domain::ClassProfile;
    use crate::surrogate::SurrogateFeature;

    fn contribution(feature: &str, contribution: f64, rank: usize) -> FeatureContribution {
        FeatureContribution {
            feature: feature.to_string(),
            value: 10.0,
            contribution,
            importance: contribution.abs(),
            rank,
        }
    }

    fn qb_attribution() -> AttributionResult {
        AttributionResult {
            baseline: 250.0,
            contributions: vec![
                contribution("passing_yards", 4.0, 1),
                contribution("completions", -1.0, 2),
            ],
            interactions: Vec::new(),
            global_importance: Vec::new(),
        }
    }

    fn qb_surrogate() -> SurrogateResult {
        SurrogateResult {
            features: vec![SurrogateFeature {
                feature: "passing_yards".to_string(),
                coefficient: 0.08,
                value: 300.0,
                confidence_interval: 0.01,
                rank: 1,
            }],
            intercept: 230.0,
            fidelity: 0.95,
            r2_score: 0.98,
            sample_count: 201,
            prediction_band: 0.4,
        }
    }

    fn qb_tables() -> DomainTables {
        DomainTables::default()
            .with_class(
                "quarterback",
                ClassProfile::new(250.0)
                    .with_feature("passing_yards", 250.0, 0.08)
                    .with_feature("completions", 22.0, 0.5),
            )
            .with_correlation("passing_yards", "completions", 0.85)
    }

    fn qb_input() -> PredictionInput {
        PredictionInput::new("p1", "quarterback", "model-v1")
            .with_feature("passing_yards", 300.0)
            .with_feature("completions", 24.0)
    }

    fn builder() -> VisualizationBuilder {
        VisualizationBuilder::default()
    }

    fn find(charts: &[ChartPayload], kind: ChartKind) -> Option<&ChartPayload> {
        charts.iter().find(|c| c.kind == kind)
    }

    #[test]
    fn test_builds_all_four_charts() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        assert_eq!(charts.len(), 4);
    }

    #[test]
    fn test_waterfall_running_totals() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let chart = find(&charts, ChartKind::Waterfall).unwrap();
        let ChartSeries::Waterfall { steps } = &chart.series else {
            panic!("expected waterfall series");
        };

        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].label, "baseline");
        assert_eq!(steps[0].running_total, 250.0);
        assert_eq!(steps[1].label, "passing_yards");
        assert!((steps[1].running_total - 254.0).abs() < 1e-9);
        assert_eq!(steps[2].label, "completions");
        assert!((steps[2].running_total - 253.0).abs() < 1e-9);
        assert_eq!(steps[3].label, "prediction");
        assert_eq!(steps[3].running_total, 253.0);
        assert!(steps[3].delta.abs() < 1e-9);
    }

    #[test]
    fn test_waterfall_collapses_overflow_into_other_factors() {
        let config = VisualizationConfig {
            max_data_points: 1,
            ..VisualizationConfig::default()
        };
        let charts = VisualizationBuilder::new(config).build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let chart = find(&charts, ChartKind::Waterfall).unwrap();
        let ChartSeries::Waterfall { steps } = &chart.series else {
            panic!("expected waterfall series");
        };

        // baseline, passing_yards, other factors, prediction
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[2].label, "other factors");
        assert!((steps[2].delta + 1.0).abs() < 1e-9);
        assert_eq!(steps[3].running_total, 253.0);
    }

    #[test]
    fn test_waterfall_shows_unexplained_gap_without_attribution() {
        let empty = AttributionResult::empty(250.0);
        let charts = builder().build(&qb_input(), 253.0, &empty, &qb_surrogate(), &qb_tables());
        let chart = find(&charts, ChartKind::Waterfall).unwrap();
        let ChartSeries::Waterfall { steps } = &chart.series else {
            panic!("expected waterfall series");
        };

        assert_eq!(steps.len(), 2);
        assert!((steps[1].delta - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ranked_bars_follow_rank_order() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let chart = find(&charts, ChartKind::RankedBars).unwrap();
        let ChartSeries::RankedBars { bars } = &chart.series else {
            panic!("expected bars series");
        };

        assert_eq!(bars[0].feature, "passing_yards");
        assert_eq!(bars[0].rank, 1);
        assert_eq!(bars[1].feature, "completions");
        assert_eq!(bars[1].rank, 2);
    }

    #[test]
    fn test_scatter_carries_confidence_band() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let chart = find(&charts, ChartKind::Scatter).unwrap();
        let ChartSeries::Scatter { points } = &chart.series else {
            panic!("expected scatter series");
        };

        assert_eq!(points[0].feature, "passing_yards");
        assert_eq!(points[0].value, 300.0);
        assert_eq!(points[0].band, 0.01);
    }

    #[test]
    fn test_scatter_skipped_without_surrogate_features() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &SurrogateResult::disabled(),
            &qb_tables(),
        );
        assert!(find(&charts, ChartKind::Scatter).is_none());
    }

    #[test]
    fn test_heatmap_is_symmetric_with_unit_diagonal() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let chart = find(&charts, ChartKind::Heatmap).unwrap();
        let ChartSeries::Heatmap { features, values } = &chart.series else {
            panic!("expected heatmap series");
        };

        assert_eq!(features.len(), 2);
        assert_eq!(features[0], "completions");
        assert_eq!(features[1], "passing_yards");
        for i in 0..features.len() {
            assert_eq!(values[i][i], 1.0);
            for j in 0..features.len() {
                assert_eq!(values[i][j], values[j][i]);
            }
        }
        assert_eq!(values[0][1], 0.85);
    }

    #[test]
    fn test_heatmap_skipped_for_unknown_class() {
        let input = PredictionInput::new("p1", "mystery", "model-v1").with_feature("x", 1.0);
        let charts = builder().build(
            &input,
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        assert!(find(&charts, ChartKind::Heatmap).is_none());
    }

    #[test]
    fn test_chart_selection_respected() {
        let config = VisualizationConfig {
            chart_types: vec![ChartKind::Waterfall],
            ..VisualizationConfig::default()
        };
        let charts = VisualizationBuilder::new(config).build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );

        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].kind, ChartKind::Waterfall);
    }

    #[test]
    fn test_disabled_builder_returns_nothing() {
        let config = VisualizationConfig {
            enabled: false,
            ..VisualizationConfig::default()
        };
        let charts = VisualizationBuilder::new(config).build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        assert!(charts.is_empty());
    }

    #[test]
    fn test_payload_serializes_with_tagged_series() {
        let charts = builder().build(
            &qb_input(),
            253.0,
            &qb_attribution(),
            &qb_surrogate(),
            &qb_tables(),
        );
        let json = serde_json::to_string(&charts[0]).unwrap();
        assert!(json.contains("\"type\":\"waterfall\""));
        assert!(json.contains("\"kind\":\"waterfall\""));
    }
}
