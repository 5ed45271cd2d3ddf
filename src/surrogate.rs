//! LIME-style local surrogate explanation
//!
//! Fits an interpretable linear model to the black-box predictor in a
//! neighborhood of the input: perturb the feature vector with Gaussian
//! noise, query the predictor for every perturbed point, weight each point
//! by an exponential locality kernel, and solve the weighted least squares
//! problem for coefficients, confidence intervals, and fit quality.
//!
//! The predictor stays opaque behind the [`Predictor`] trait; the engine
//! only observes its scalar outputs. Sampling is seeded from the input
//! fingerprint, so repeated runs over the same input agree exactly.
//!
//! ## Features
//!
//! - Gaussian perturbation with per-feature noise scaled to the value
//! - Locality kernel `exp(-d^2 / kernel_width^2)` over relative deviations
//! - Ridge-stabilized normal equations solved by Gauss-Jordan elimination
//! - 95% confidence intervals from the regression standard error
//! - Cooperative deadline checks between predictor calls
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//! use explicar::error::{Deadline, Result};
//! use explicar::input::{PredictionContext, PredictionInput};
//! use explicar::surrogate::{Predictor, SurrogateConfig, SurrogateEngine};
//!
//! struct Doubler;
//! impl Predictor for Doubler {
//!     fn predict(&self, features: &BTreeMap<String, f64>, _: &PredictionContext) -> Result<f64> {
//!         Ok(2.0 * features.values().sum::<f64>())
//!     }
//! }
//!
//! let engine = SurrogateEngine::new(SurrogateConfig::default());
//! let input = PredictionInput::new("p1", "quarterback", "model-v1").with_feature("x", 10.0);
//! let deadline = Deadline::new(Duration::from_secs(5));
//!
//! let result = engine.compute(&input, 20.0, &Doubler, &deadline).unwrap();
//! assert!((result.features[0].coefficient - 2.0).abs() < 1e-3);
//! assert!(result.fidelity > 0.9);
//! ```

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{ComputeStage, Deadline, ExplicarError, Result};
use crate::input::{PredictionContext, PredictionInput};

/// Ridge term added to the normal equations diagonal
const RIDGE: f64 = 1e-8;
/// Two-sided 95% z-score for confidence intervals
const Z_95: f64 = 1.96;
/// Pivot threshold below which the system counts as singular
const SINGULAR_EPS: f64 = 1e-12;

/// Black-box prediction model the surrogate approximates locally
///
/// Implementations are expected to be near-deterministic: the same feature
/// vector and context should produce the same output within noise.
pub trait Predictor: Send + Sync {
    /// Predict the model output for a feature vector in the given context
    ///
    /// # Errors
    ///
    /// Implementations surface their own failures; the engine reports them
    /// as prediction-stage computation errors.
    fn predict(&self, features: &BTreeMap<String, f64>, context: &PredictionContext)
        -> Result<f64>;
}

/// Configuration for the surrogate engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateConfig {
    /// When false, `compute` returns an empty result without touching the predictor
    pub enabled: bool,
    /// Number of perturbed samples to draw
    pub num_samples: usize,
    /// Keep at most this many ranked coefficients; 0 keeps all
    pub num_features: usize,
    /// Locality kernel width; larger values flatten the weighting
    pub kernel_width: f64,
    /// Noise standard deviation as a fraction of each feature value
    pub noise_fraction: f64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_samples: 200,
            num_features: 10,
            kernel_width: 0.75,
            noise_fraction: 0.1,
        }
    }
}

/// One feature's coefficient in the fitted surrogate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateFeature {
    /// Feature name
    pub feature: String,
    /// Linear coefficient in the local model
    pub coefficient: f64,
    /// Observed feature value the neighborhood is centered on
    pub value: f64,
    /// Half-width of the 95% confidence interval around the coefficient
    pub confidence_interval: f64,
    /// 1-based rank by coefficient magnitude
    pub rank: usize,
}

/// Complete surrogate output for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateResult {
    /// Ranked coefficients, rank 1 first
    pub features: Vec<SurrogateFeature>,
    /// Intercept of the local model
    pub intercept: f64,
    /// How faithfully the surrogate reproduces the predictor, in [0, 1]
    pub fidelity: f64,
    /// Weighted coefficient of determination, clamped to [0, 1]
    pub r2_score: f64,
    /// Number of samples the fit used, including the unperturbed input
    pub sample_count: usize,
    /// Half-width of the 95% interval around the fitted value at the input
    pub prediction_band: f64,
}

impl SurrogateResult {
    /// Empty result used when the surrogate engine is disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            features: Vec::new(),
            intercept: 0.0,
            fidelity: 0.0,
            r2_score: 0.0,
            sample_count: 0,
            prediction_band: 0.0,
        }
    }
}

/// Fits local linear surrogates against a black-box predictor
#[derive(Debug, Clone)]
pub struct SurrogateEngine {
    config: SurrogateConfig,
}

impl SurrogateEngine {
    /// Create an engine with the given configuration
    #[must_use]
    pub fn new(config: SurrogateConfig) -> Self {
        Self { config }
    }

    /// Fit a local surrogate around `input`
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes between samples,
    /// prediction-stage `Computation` when the predictor fails or yields a
    /// non-finite value, and surrogate-stage `Computation` for degenerate
    /// configurations (too few samples, non-positive kernel width).
    pub fn compute(
        &self,
        input: &PredictionInput,
        predicted_value: f64,
        predictor: &dyn Predictor,
        deadline: &Deadline,
    ) -> Result<SurrogateResult> {
        if !self.config.enabled {
            return Ok(SurrogateResult::disabled());
        }
        if self.config.kernel_width <= 0.0 {
            return Err(ExplicarError::computation(
                ComputeStage::Surrogate,
                "kernel width must be positive",
            ));
        }

        let (names, original): (Vec<String>, Vec<f64>) = input
            .features
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .unzip();
        let dims = names.len();
        let params = dims + 1;
        let samples = self.config.num_samples + 1;
        if samples <= params {
            return Err(ExplicarError::computation(
                ComputeStage::Surrogate,
                format!("{} samples cannot fit {dims} features", self.config.num_samples),
            ));
        }

        let normals = self.noise_distributions(&original)?;
        let mut rng = StdRng::seed_from_u64(input.fingerprint().hash64());

        // Row layout: dims feature columns plus a trailing intercept column.
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(samples);
        let mut outputs: Vec<f64> = Vec::with_capacity(samples);
        let mut weights: Vec<f64> = Vec::with_capacity(samples);

        let mut first_row = original.clone();
        first_row.push(1.0);
        rows.push(first_row);
        outputs.push(predicted_value);
        weights.push(1.0);

        for _ in 0..self.config.num_samples {
            deadline.check()?;

            let perturbed: Vec<f64> = original
                .iter()
                .zip(&normals)
                .map(|(value, dist)| {
                    let moved = value + dist.sample(&mut rng);
                    // Count-like features stay in their valid domain
                    if *value >= 0.0 {
                        moved.max(0.0)
                    } else {
                        moved
                    }
                })
                .collect();
            let feature_map: BTreeMap<String, f64> = names
                .iter()
                .cloned()
                .zip(perturbed.iter().copied())
                .collect();

            let output = predictor
                .predict(&feature_map, &input.context)
                .map_err(|e| {
                    ExplicarError::computation(ComputeStage::Prediction, e.to_string())
                })?;
            if !output.is_finite() {
                return Err(ExplicarError::computation(
                    ComputeStage::Prediction,
                    "predictor returned a non-finite value",
                ));
            }

            weights.push(self.kernel_weight(&original, &perturbed));
            let mut row = perturbed;
            row.push(1.0);
            rows.push(row);
            outputs.push(output);
        }

        let beta = solve_weighted(&rows, &outputs, &weights)?;
        Ok(self.assemble(&names, &original, &rows, &outputs, &weights, &beta))
    }

    /// One Gaussian per feature, sigma proportional to the value magnitude
    fn noise_distributions(&self, original: &[f64]) -> Result<Vec<Normal<f64>>> {
        original
            .iter()
            .map(|value| {
                let sigma = (value.abs() * self.config.noise_fraction).max(0.0);
                Normal::new(0.0, sigma).map_err(|e| {
                    ExplicarError::computation(
                        ComputeStage::Surrogate,
                        format!("noise distribution: {e}"),
                    )
                })
            })
            .collect()
    }

    /// Exponential locality kernel over mean squared relative deviation
    fn kernel_weight(&self, original: &[f64], perturbed: &[f64]) -> f64 {
        let mut dist2 = 0.0;
        for (value, moved) in original.iter().zip(perturbed) {
            let scale = if value.abs() > 0.0 { value.abs() } else { 1.0 };
            let rel = (moved - value) / scale;
            dist2 += rel * rel;
        }
        dist2 /= original.len() as f64;
        let kw = self.config.kernel_width;
        (-dist2 / (kw * kw)).exp()
    }

    /// Build the ranked result with fit-quality metrics
    fn assemble(
        &self,
        names: &[String],
        original: &[f64],
        rows: &[Vec<f64>],
        outputs: &[f64],
        weights: &[f64],
        beta: &Fitted,
    ) -> SurrogateResult {
        let samples = rows.len();
        let params = beta.coefficients.len();
        let dims = params - 1;

        let mut ss_res_w = 0.0;
        let mut ss_res = 0.0;
        let mut weight_sum = 0.0;
        let mut weighted_mean = 0.0;
        for ((row, y), w) in rows.iter().zip(outputs).zip(weights) {
            let fitted = dot(row, &beta.coefficients);
            let residual = y - fitted;
            ss_res_w += w * residual * residual;
            ss_res += residual * residual;
            weight_sum += w;
            weighted_mean += w * y;
        }
        weighted_mean /= weight_sum;

        let ss_tot_w: f64 = outputs
            .iter()
            .zip(weights)
            .map(|(y, w)| w * (y - weighted_mean) * (y - weighted_mean))
            .sum();
        let r2_score = if ss_tot_w < SINGULAR_EPS {
            // Constant neighborhood: perfect fit if the residuals vanish too
            if ss_res_w < SINGULAR_EPS {
                1.0
            } else {
                0.0
            }
        } else {
            (1.0 - ss_res_w / ss_tot_w).clamp(0.0, 1.0)
        };

        let mean = outputs.iter().sum::<f64>() / samples as f64;
        let variance = outputs.iter().map(|y| (y - mean) * (y - mean)).sum::<f64>()
            / samples as f64;
        let rmse = (ss_res / samples as f64).sqrt();
        let spread = variance.sqrt();
        let nrmse = if spread < SINGULAR_EPS { rmse } else { rmse / spread };
        let fidelity = 1.0 / (1.0 + nrmse);

        // Standard errors from the inverted normal equations
        let sigma2 = ss_res_w / (samples - params) as f64;
        let mut features: Vec<SurrogateFeature> = (0..dims)
            .map(|j| SurrogateFeature {
                feature: names[j].clone(),
                coefficient: beta.coefficients[j],
                value: original[j],
                confidence_interval: Z_95 * (sigma2 * beta.inverse_diag[j]).max(0.0).sqrt(),
                rank: 0,
            })
            .collect();
        features.sort_by(|a, b| {
            b.coefficient
                .abs()
                .total_cmp(&a.coefficient.abs())
                .then_with(|| a.feature.cmp(&b.feature))
        });
        if self.config.num_features > 0 {
            features.truncate(self.config.num_features);
        }
        for (index, entry) in features.iter_mut().enumerate() {
            entry.rank = index + 1;
        }

        SurrogateResult {
            features,
            intercept: beta.coefficients[dims],
            fidelity,
            r2_score,
            sample_count: samples,
            prediction_band: Z_95 * (sigma2 * beta.center_leverage).max(0.0).sqrt(),
        }
    }
}

/// Solved coefficients plus the inverse terms the error analysis needs
struct Fitted {
    coefficients: Vec<f64>,
    inverse_diag: Vec<f64>,
    /// Leverage `x0^T A^-1 x0` of the unperturbed input row
    center_leverage: f64,
}

/// Solve `(X^T W X + ridge I) beta = X^T W y` by Gauss-Jordan inversion
fn solve_weighted(rows: &[Vec<f64>], outputs: &[f64], weights: &[f64]) -> Result<Fitted> {
    let params = rows[0].len();
    let mut normal = vec![vec![0.0; params]; params];
    let mut moment = vec![0.0; params];

    for ((row, y), w) in rows.iter().zip(outputs).zip(weights) {
        for r in 0..params {
            let wr = w * row[r];
            moment[r] += wr * y;
            for c in 0..params {
                normal[r][c] += wr * row[c];
            }
        }
    }
    for (j, row) in normal.iter_mut().enumerate() {
        row[j] += RIDGE;
    }

    let inverse = invert(&normal).ok_or_else(|| {
        ExplicarError::computation(ComputeStage::Surrogate, "singular normal equations")
    })?;

    let coefficients: Vec<f64> = inverse
        .iter()
        .map(|row| dot(row, &moment))
        .collect();
    let inverse_diag: Vec<f64> = (0..params).map(|j| inverse[j][j]).collect();
    let center = &rows[0];
    let center_leverage = inverse
        .iter()
        .zip(center)
        .map(|(row, x)| x * dot(row, center))
        .sum();
    Ok(Fitted {
        coefficients,
        inverse_diag,
        center_leverage,
    })
}

/// Gauss-Jordan inversion with partial pivoting; `None` when singular
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let size = matrix.len();
    let mut aug: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut extended = row.clone();
            extended.extend((0..size).map(|j| if i == j { 1.0 } else { 0.0 }));
            extended
        })
        .collect();

    for col in 0..size {
        let mut pivot_row = col;
        for r in col + 1..size {
            if aug[r][col].abs() > aug[pivot_row][col].abs() {
                pivot_row = r;
            }
        }
        if aug[pivot_row][col].abs() < SINGULAR_EPS {
            return None;
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for value in aug[col].iter_mut() {
            *value /= pivot;
        }

        let pivot_values = aug[col].clone();
        for (r, row) in aug.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let factor = row[col];
            if factor != 0.0 {
                for (value, pivot_value) in row.iter_mut().zip(&pivot_values) {
                    *value -= factor * pivot_value;
                }
            }
        }
    }

    Some(aug.into_iter().map(|row| row[size..].to_vec()).collect())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
