//! Error types for explanation operations
//!
//! Every fallible path in the crate surfaces one of the variants below.
//! Failures are terminal for the request that hit them: the engine records
//! the failure in its metrics, emits a lifecycle event, and propagates the
//! error to the caller without retrying.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Result type alias for explanation operations
pub type Result<T> = std::result::Result<T, ExplicarError>;

/// Pipeline stage in which a computation failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeStage {
    /// SHAP-style attribution computation
    Attribution,
    /// LIME-style local surrogate fitting
    Surrogate,
    /// External predictor invocation during surrogate sampling
    Prediction,
    /// Natural-language narrative generation
    Narrative,
    /// Visualization payload construction
    Visualization,
}

impl ComputeStage {
    /// Stable lowercase name, used in error messages and event payloads
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attribution => "attribution",
            Self::Surrogate => "surrogate",
            Self::Prediction => "prediction",
            Self::Narrative => "narrative",
            Self::Visualization => "visualization",
        }
    }
}

impl std::fmt::Display for ComputeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error type for explanation engine operations
#[derive(Debug, Error)]
pub enum ExplicarError {
    /// The engine is administratively disabled; nothing was computed or cached
    #[error("Explanation engine is disabled")]
    EngineDisabled,

    /// An equivalent computation is already in flight for this fingerprint
    #[error("Explanation already in progress for fingerprint {fingerprint}")]
    AlreadyInProgress {
        /// Canonical fingerprint of the duplicate request
        fingerprint: String,
    },

    /// A sub-engine failed while computing the explanation
    #[error("Computation failed in {stage}: {reason}")]
    Computation {
        /// Stage that produced the failure
        stage: ComputeStage,
        /// Human-readable failure description
        reason: String,
    },

    /// The computation exceeded its time budget
    #[error("Explanation timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout {
        /// Wall-clock time spent before cancellation
        elapsed_ms: u64,
        /// Configured time budget
        budget_ms: u64,
    },

    /// The input failed boundary validation before any computation started
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: String,
    },
}

impl ExplicarError {
    /// Shorthand constructor for computation failures
    #[must_use]
    pub fn computation(stage: ComputeStage, reason: impl Into<String>) -> Self {
        Self::Computation {
            stage,
            reason: reason.into(),
        }
    }

    /// True for errors a caller may retry after backing off
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyInProgress { .. } | Self::Timeout { .. })
    }
}

/// Absolute time budget for one computation
///
/// Long-running loops call [`Deadline::check`] between units of work, so an
/// overrunning computation cancels at the next checkpoint instead of running
/// to completion.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock with the given budget
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Time spent since the clock started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Budget left before the deadline, zero once it has passed
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    /// Fail with `Timeout` once the budget is spent
    ///
    /// # Errors
    ///
    /// Returns `Timeout` carrying the elapsed and budgeted milliseconds.
    pub fn check(&self) -> Result<()> {
        let elapsed = self.start.elapsed();
        if elapsed > self.budget {
            return Err(ExplicarError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: self.budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_display() {
        let err = ExplicarError::EngineDisabled;
        assert_eq!(err.to_string(), "Explanation engine is disabled");
    }

    #[test]
    fn test_already_in_progress_display() {
        let err = ExplicarError::AlreadyInProgress {
            fingerprint: "abc123".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_computation_display_names_stage() {
        let err = ExplicarError::computation(ComputeStage::Surrogate, "singular matrix");
        let msg = err.to_string();
        assert!(msg.contains("surrogate"));
        assert!(msg.contains("singular matrix"));
    }

    #[test]
    fn test_timeout_display_carries_budget() {
        let err = ExplicarError::Timeout {
            elapsed_ms: 5120,
            budget_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("5120"));
        assert!(msg.contains("5000"));
    }

    #[test]
    fn test_stage_names_are_stable() {
        assert_eq!(ComputeStage::Attribution.name(), "attribution");
        assert_eq!(ComputeStage::Surrogate.name(), "surrogate");
        assert_eq!(ComputeStage::Prediction.name(), "prediction");
        assert_eq!(ComputeStage::Narrative.name(), "narrative");
        assert_eq!(ComputeStage::Visualization.name(), "visualization");
    }

    #[test]
    fn test_deadline_within_budget() {
        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn test_deadline_exceeded() {
        let deadline = Deadline::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let err = deadline.check().unwrap_err();
        assert!(matches!(err, ExplicarError::Timeout { budget_ms: 0, .. }));
    }

    #[test]
    fn test_deadline_remaining_shrinks_to_zero() {
        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(deadline.remaining() <= Duration::from_secs(60));
        assert!(deadline.remaining() > Duration::from_secs(59));

        let spent = Deadline::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(spent.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ExplicarError::AlreadyInProgress {
            fingerprint: "x".to_string()
        }
        .is_retryable());
        assert!(ExplicarError::Timeout {
            elapsed_ms: 1,
            budget_ms: 1
        }
        .is_retryable());
        assert!(!ExplicarError::EngineDisabled.is_retryable());
        assert!(!ExplicarError::InvalidInput {
            reason: "empty".to_string()
        }
        .is_retryable());
    }
}
