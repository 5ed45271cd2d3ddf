//! Metrics collection and health reporting for the explanation engine
//!
//! Tracks lifetime counters (explanations, failures, cache hits, compute
//! time) alongside a rolling window of recent runs. The window drives the
//! health predicate: the engine is unhealthy once the rolling error rate
//! reaches 5% or the rolling average latency reaches the configured
//! timeout. Metrics are exposed in Prometheus format for scraping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Number of recent runs the health window keeps
pub const HEALTH_WINDOW: usize = 100;
/// Rolling error rate at which the engine reports unhealthy
pub const HEALTH_ERROR_RATE: f64 = 0.05;

/// One run's outcome in the rolling window
#[derive(Debug, Clone, Copy)]
struct RunSample {
    failed: bool,
    latency_us: u64,
}

/// Central metrics collector for tracking engine behavior
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// Total number of explanation runs recorded
    total_explanations: Arc<AtomicUsize>,
    /// Runs that produced a record
    successful_explanations: Arc<AtomicUsize>,
    /// Runs that ended in an error
    failed_explanations: Arc<AtomicUsize>,
    /// Successful runs served from the cache
    cache_hits: Arc<AtomicUsize>,
    /// Failed runs that ended in a timeout
    timeouts: Arc<AtomicUsize>,
    /// Total compute time of successful runs in microseconds
    total_compute_time_us: Arc<AtomicU64>,
    /// Recent runs driving the health predicate
    window: Arc<Mutex<VecDeque<RunSample>>>,
    /// Start time for rate calculations
    start_time: Instant,
}

impl MetricsCollector {
    /// Create a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_explanations: Arc::new(AtomicUsize::new(0)),
            successful_explanations: Arc::new(AtomicUsize::new(0)),
            failed_explanations: Arc::new(AtomicUsize::new(0)),
            cache_hits: Arc::new(AtomicUsize::new(0)),
            timeouts: Arc::new(AtomicUsize::new(0)),
            total_compute_time_us: Arc::new(AtomicU64::new(0)),
            window: Arc::new(Mutex::new(VecDeque::with_capacity(HEALTH_WINDOW))),
            start_time: Instant::now(),
        }
    }

    /// Record a run that produced an explanation record
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_success(&self, duration: Duration, cache_hit: bool) {
        self.total_explanations.fetch_add(1, Ordering::Relaxed);
        self.successful_explanations.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total_compute_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.push_sample(RunSample {
            failed: false,
            latency_us: duration.as_micros() as u64,
        });
    }

    /// Record a run that ended in an error
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_failure(&self, duration: Duration, timed_out: bool) {
        self.total_explanations.fetch_add(1, Ordering::Relaxed);
        self.failed_explanations.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.push_sample(RunSample {
            failed: true,
            latency_us: duration.as_micros() as u64,
        });
    }

    /// Health predicate over the rolling window
    ///
    /// Healthy while the rolling error rate stays under
    /// [`HEALTH_ERROR_RATE`] and the rolling average latency stays under
    /// `timeout`. An empty window reports healthy.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_healthy(&self, timeout: Duration) -> bool {
        let window = self.lock_window();
        if window.is_empty() {
            return true;
        }
        let failures = window.iter().filter(|sample| sample.failed).count();
        if failures as f64 / window.len() as f64 >= HEALTH_ERROR_RATE {
            return false;
        }
        let total_us: u64 = window.iter().map(|sample| sample.latency_us).sum();
        let avg_ms = total_us as f64 / 1000.0 / window.len() as f64;
        avg_ms < timeout.as_millis() as f64
    }

    /// Get current snapshot of metrics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_explanations.load(Ordering::Relaxed);
        let successful = self.successful_explanations.load(Ordering::Relaxed);
        let failed = self.failed_explanations.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);
        let total_time_us = self.total_compute_time_us.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed();

        let (rolling_samples, rolling_error_rate, rolling_avg_latency_ms) = {
            let window = self.lock_window();
            if window.is_empty() {
                (0, 0.0, 0.0)
            } else {
                let failures = window.iter().filter(|sample| sample.failed).count();
                let total_us: u64 = window.iter().map(|sample| sample.latency_us).sum();
                (
                    window.len(),
                    failures as f64 / window.len() as f64,
                    total_us as f64 / 1000.0 / window.len() as f64,
                )
            }
        };

        MetricsSnapshot {
            total_explanations: total,
            successful_explanations: successful,
            failed_explanations: failed,
            cache_hits,
            timeouts,
            total_compute_time_us: total_time_us,
            uptime_secs: uptime.as_secs(),
            explanations_per_sec: if uptime.as_secs() > 0 {
                total as f64 / uptime.as_secs_f64()
            } else {
                0.0
            },
            avg_latency_ms: if successful > 0 {
                (total_time_us as f64 / 1000.0) / successful as f64
            } else {
                0.0
            },
            error_rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
            cache_hit_rate: if total > 0 {
                cache_hits as f64 / total as f64
            } else {
                0.0
            },
            rolling_samples,
            rolling_error_rate,
            rolling_avg_latency_ms,
        }
    }

    /// Export metrics in Prometheus format
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "# HELP explicar_explanations_total Total number of explanation runs\n\
             # TYPE explicar_explanations_total counter\n\
             explicar_explanations_total {}\n\
             # HELP explicar_explanations_successful Successful explanation runs\n\
             # TYPE explicar_explanations_successful counter\n\
             explicar_explanations_successful {}\n\
             # HELP explicar_explanations_failed Failed explanation runs\n\
             # TYPE explicar_explanations_failed counter\n\
             explicar_explanations_failed {}\n\
             # HELP explicar_cache_hits Explanations served from the cache\n\
             # TYPE explicar_cache_hits counter\n\
             explicar_cache_hits {}\n\
             # HELP explicar_timeouts Runs that exceeded their deadline\n\
             # TYPE explicar_timeouts counter\n\
             explicar_timeouts {}\n\
             # HELP explicar_compute_time_seconds Total compute time\n\
             # TYPE explicar_compute_time_seconds counter\n\
             explicar_compute_time_seconds {:.6}\n\
             # HELP explicar_explanations_per_second Explanation rate\n\
             # TYPE explicar_explanations_per_second gauge\n\
             explicar_explanations_per_second {:.2}\n\
             # HELP explicar_avg_latency_ms Average latency in milliseconds\n\
             # TYPE explicar_avg_latency_ms gauge\n\
             explicar_avg_latency_ms {:.2}\n\
             # HELP explicar_error_rate Error rate (0.0-1.0)\n\
             # TYPE explicar_error_rate gauge\n\
             explicar_error_rate {:.4}\n\
             # HELP explicar_cache_hit_rate Cache hit rate (0.0-1.0)\n\
             # TYPE explicar_cache_hit_rate gauge\n\
             explicar_cache_hit_rate {:.4}\n\
             # HELP explicar_rolling_error_rate Error rate over recent runs\n\
             # TYPE explicar_rolling_error_rate gauge\n\
             explicar_rolling_error_rate {:.4}\n\
             # HELP explicar_rolling_avg_latency_ms Average latency over recent runs\n\
             # TYPE explicar_rolling_avg_latency_ms gauge\n\
             explicar_rolling_avg_latency_ms {:.2}\n\
             # HELP explicar_uptime_seconds Uptime in seconds\n\
             # TYPE explicar_uptime_seconds counter\n\
             explicar_uptime_seconds {}\n",
            snapshot.total_explanations,
            snapshot.successful_explanations,
            snapshot.failed_explanations,
            snapshot.cache_hits,
            snapshot.timeouts,
            snapshot.total_compute_time_us as f64 / 1_000_000.0,
            snapshot.explanations_per_sec,
            snapshot.avg_latency_ms,
            snapshot.error_rate,
            snapshot.cache_hit_rate,
            snapshot.rolling_error_rate,
            snapshot.rolling_avg_latency_ms,
            snapshot.uptime_secs
        )
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.total_explanations.store(0, Ordering::Relaxed);
        self.successful_explanations.store(0, Ordering::Relaxed);
        self.failed_explanations.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.total_compute_time_us.store(0, Ordering::Relaxed);
        self.lock_window().clear();
    }

    fn push_sample(&self, sample: RunSample) {
        let mut window = self.lock_window();
        window.push_back(sample);
        while window.len() > HEALTH_WINDOW {
            window.pop_front();
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, VecDeque<RunSample>> {
        // Window mutations are single-step, so a poisoned deque is still
        // internally consistent and safe to reuse.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total number of explanation runs recorded
    pub total_explanations: usize,
    /// Runs that produced a record
    pub successful_explanations: usize,
    /// Runs that ended in an error
    pub failed_explanations: usize,
    /// Successful runs served from the cache
    pub cache_hits: usize,
    /// Failed runs that ended in a timeout
    pub timeouts: usize,
    /// Total compute time of successful runs in microseconds
    pub total_compute_time_us: u64,
    /// System uptime in seconds
    pub uptime_secs: u64,
    /// Explanation rate (runs per second)
    pub explanations_per_sec: f64,
    /// Average successful-run latency in milliseconds
    pub avg_latency_ms: f64,
    /// Lifetime error rate as a fraction (0.0 to 1.0)
    pub error_rate: f64,
    /// Lifetime cache hit rate as a fraction (0.0 to 1.0)
    pub cache_hit_rate: f64,
    /// Number of runs currently in the rolling window
    pub rolling_samples: usize,
    /// Error rate over the rolling window
    pub rolling_error_rate: f64,
    /// Average latency over the rolling window in milliseconds
    pub rolling_avg_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_collector_creation() {
        let metrics = MetricsCollector::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.total_explanations, 0);
        assert_eq!(snapshot.successful_explanations, 0);
        assert_eq!(snapshot.failed_explanations, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.total_compute_time_us, 0);
        assert_eq!(snapshot.rolling_samples, 0);
    }

    #[test]
    fn test_record_success() {
        let metrics = MetricsCollector::new();
        metrics.record_success(Duration::from_millis(100), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_explanations, 1);
        assert_eq!(snapshot.successful_explanations, 1);
        assert_eq!(snapshot.failed_explanations, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert!(snapshot.total_compute_time_us >= 100_000);
        assert_eq!(snapshot.rolling_samples, 1);
    }

    #[test]
    fn test_record_cache_hit_counts_as_success() {
        let metrics = MetricsCollector::new();
        metrics.record_success(Duration::from_micros(50), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.successful_explanations, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_hit_rate, 1.0);
    }

    #[test]
    fn test_record_failure() {
        let metrics = MetricsCollector::new();
        metrics.record_failure(Duration::from_millis(10), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_explanations, 1);
        assert_eq!(snapshot.successful_explanations, 0);
        assert_eq!(snapshot.failed_explanations, 1);
        assert_eq!(snapshot.error_rate, 1.0);
    }

    #[test]
    fn test_timeout_failures_counted_separately() {
        let metrics = MetricsCollector::new();
        metrics.record_failure(Duration::from_millis(10), false);
        metrics.record_failure(Duration::from_millis(5000), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_explanations, 2);
        assert_eq!(snapshot.timeouts, 1);
    }

    #[test]
    fn test_multiple_runs() {
        let metrics = MetricsCollector::new();

        metrics.record_success(Duration::from_millis(50), false);
        metrics.record_success(Duration::from_millis(100), true);
        metrics.record_failure(Duration::from_millis(10), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_explanations, 3);
        assert_eq!(snapshot.successful_explanations, 2);
        assert_eq!(snapshot.failed_explanations, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.error_rate, 1.0 / 3.0);
    }

    #[test]
    fn test_avg_latency_calculation() {
        let metrics = MetricsCollector::new();

        metrics.record_success(Duration::from_millis(100), false);
        metrics.record_success(Duration::from_millis(200), false);

        let snapshot = metrics.snapshot();
        assert!((snapshot.avg_latency_ms - 150.0).abs() < 1.0);
        assert!((snapshot.rolling_avg_latency_ms - 150.0).abs() < 1.0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = MetricsCollector::new();
        metrics.record_success(Duration::from_millis(100), false);
        metrics.record_failure(Duration::from_millis(10), false);

        let prom = metrics.to_prometheus();

        assert!(prom.contains("explicar_explanations_total 2"));
        assert!(prom.contains("explicar_explanations_successful 1"));
        assert!(prom.contains("explicar_explanations_failed 1"));
        assert!(prom.contains("explicar_error_rate 0.5000"));
        assert!(prom.contains("# TYPE explicar_rolling_error_rate gauge"));
    }

    #[test]
    fn test_reset_metrics() {
        let metrics = MetricsCollector::new();
        metrics.record_success(Duration::from_millis(100), false);
        metrics.record_failure(Duration::from_millis(10), true);

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_explanations, 0);
        assert_eq!(snapshot.successful_explanations, 0);
        assert_eq!(snapshot.failed_explanations, 0);
        assert_eq!(snapshot.timeouts, 0);
        assert_eq!(snapshot.rolling_samples, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = MetricsCollector::new();
        let metrics_clone = metrics.clone();

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                metrics_clone.record_success(Duration::from_micros(100), false);
            }
        });

        for _ in 0..100 {
            metrics.record_success(Duration::from_micros(100), false);
        }

        handle.join().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_explanations, 200);
        assert_eq!(snapshot.successful_explanations, 200);
        assert_eq!(snapshot.rolling_samples, HEALTH_WINDOW);
    }

    #[test]
    fn test_zero_division_safety() {
        let metrics = MetricsCollector::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.explanations_per_sec, 0.0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.cache_hit_rate, 0.0);
        assert_eq!(snapshot.rolling_error_rate, 0.0);
    }

    // ========================================================================
    // Health predicate
    // ========================================================================

    #[test]
    fn test_healthy_when_idle() {
        let metrics = MetricsCollector::new();
        assert!(metrics.is_healthy(Duration::from_secs(5)));
    }

    #[test]
    fn test_unhealthy_once_error_rate_reaches_threshold() {
        let metrics = MetricsCollector::new();
        for _ in 0..94 {
            metrics.record_success(Duration::from_micros(100), false);
        }
        for _ in 0..6 {
            metrics.record_failure(Duration::from_micros(100), false);
        }

        // 6 failures in the last 100 runs is past the 5% threshold
        assert!(!metrics.is_healthy(Duration::from_secs(5)));
        assert!((metrics.snapshot().rolling_error_rate - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_healthy_below_error_threshold() {
        let metrics = MetricsCollector::new();
        for _ in 0..96 {
            metrics.record_success(Duration::from_micros(100), false);
        }
        for _ in 0..4 {
            metrics.record_failure(Duration::from_micros(100), false);
        }

        assert!(metrics.is_healthy(Duration::from_secs(5)));
    }

    #[test]
    fn test_unhealthy_when_latency_reaches_timeout() {
        let metrics = MetricsCollector::new();
        for _ in 0..10 {
            metrics.record_success(Duration::from_millis(100), false);
        }

        assert!(!metrics.is_healthy(Duration::from_millis(50)));
        assert!(metrics.is_healthy(Duration::from_millis(500)));
    }

    #[test]
    fn test_old_failures_age_out_of_window() {
        let metrics = MetricsCollector::new();
        for _ in 0..10 {
            metrics.record_failure(Duration::from_micros(100), false);
        }
        assert!(!metrics.is_healthy(Duration::from_secs(5)));

        for _ in 0..HEALTH_WINDOW {
            metrics.record_success(Duration::from_micros(100), false);
        }
        assert!(metrics.is_healthy(Duration::from_secs(5)));
    }

    #[test]
    fn test_rolling_window_trims_to_capacity() {
        let metrics = MetricsCollector::new();
        for _ in 0..HEALTH_WINDOW + 50 {
            metrics.record_success(Duration::from_micros(100), false);
        }

        assert_eq!(metrics.snapshot().rolling_samples, HEALTH_WINDOW);
    }
}
