//! Performance monitoring.
//!
//! Every placement operation carries an [`OperationMonitor`] that accumulates
//! phase timings and counts. When the operation ends, the frozen
//! [`OperationMetrics`] are handed to a [`PerformanceMonitor`], which feeds
//! three sinks:
//!
//! ```text
//!                      ┌──► aggregate (counts, success rate, averages)
//! OperationMetrics ────┼──► rolling history ──► PerformanceTrend
//!                      └──► threshold checker ──► rate-limited warn!
//! ```
//!
//! When monitoring is disabled, [`NoopMonitor`] is used instead so call sites
//! need no conditional logic.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; every placement worker records
//! into the same monitor.

mod history;
mod metrics;
mod thresholds;

pub use history::{PerformanceTrend, DEGRADING_RATIO, IMPROVING_RATIO};
pub use metrics::{OperationMetrics, OperationMonitor, OperationOutcome, Phase};
pub use thresholds::ThresholdKind;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::MonitorConfig;
use crate::identity::RequestId;

use history::MetricsHistory;
use thresholds::ThresholdChecker;

/// Aggregate performance figures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    /// Operations recorded.
    pub total_operations: u64,
    /// Operations that placed their requester.
    pub successes: u64,
    /// Operations that failed.
    pub failures: u64,
    /// Operations that were cancelled.
    pub cancellations: u64,
    /// Successes over successes plus failures.
    pub success_rate: f64,
    /// Mean resource-load time in milliseconds.
    pub avg_resource_load_ms: f64,
    /// Mean search time in milliseconds.
    pub avg_search_ms: f64,
    /// Mean validation time in milliseconds.
    pub avg_validation_ms: f64,
    /// Mean placement-action time in milliseconds.
    pub avg_main_thread_ms: f64,
    /// Mean total time in milliseconds.
    pub avg_total_ms: f64,
    /// Mean candidates checked per operation.
    pub avg_candidates_checked: f64,
    /// Mean efficiency score of successful operations.
    pub avg_efficiency: f64,
    /// Ceilings exceeded so far.
    pub threshold_violations: u64,
    /// Trend over the rolling history.
    pub trend: PerformanceTrend,
}

/// Sink for finished operations.
pub trait PerformanceMonitor: Send + Sync {
    /// Starts measuring an operation.
    fn begin(&self, request_id: RequestId) -> OperationMonitor {
        OperationMonitor::new(request_id)
    }

    /// Records a finished operation.
    fn record(&self, metrics: &OperationMetrics);

    /// Aggregate figures.
    fn stats(&self) -> PerformanceStats;

    /// Trend over the rolling history.
    fn trend(&self) -> PerformanceTrend;

    /// Most recent `n` operations, newest last.
    fn recent(&self, n: usize) -> Vec<OperationMetrics>;

    /// Prunes the rolling history. Called by the maintenance scheduler.
    fn housekeeping(&self);

    /// Ceilings exceeded so far, suppressed warnings included.
    fn threshold_violations(&self) -> u64;

    /// Warnings actually logged.
    fn warnings_emitted(&self) -> u64;

    /// Whether this monitor keeps anything.
    fn is_enabled(&self) -> bool {
        true
    }
}

// =============================================================================
// Default monitor
// =============================================================================

#[derive(Debug, Default)]
struct Aggregate {
    total: u64,
    successes: u64,
    failures: u64,
    cancellations: u64,
    resource_load: Duration,
    search: Duration,
    validation: Duration,
    main_thread: Duration,
    total_time: Duration,
    candidates_checked: u64,
    efficiency_sum: f64,
}

impl Aggregate {
    fn add(&mut self, metrics: &OperationMetrics) {
        self.total += 1;
        match metrics.outcome {
            OperationOutcome::Success => self.successes += 1,
            OperationOutcome::Failure => self.failures += 1,
            OperationOutcome::Cancelled => self.cancellations += 1,
        }
        self.resource_load += metrics.resource_load;
        self.search += metrics.search;
        self.validation += metrics.validation;
        self.main_thread += metrics.main_thread;
        self.total_time += metrics.total_time();
        self.candidates_checked += metrics.candidates_checked as u64;
        self.efficiency_sum += metrics.efficiency_score();
    }

    fn average_ms(&self, sum: Duration) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            sum.as_secs_f64() * 1000.0 / self.total as f64
        }
    }
}

/// Monitor keeping aggregates, a rolling history and threshold warnings.
#[derive(Debug)]
pub struct DefaultPerformanceMonitor {
    config: MonitorConfig,
    aggregate: Mutex<Aggregate>,
    history: Mutex<MetricsHistory>,
    thresholds: Mutex<ThresholdChecker>,
    violations: AtomicU64,
    warnings: AtomicU64,
}

impl DefaultPerformanceMonitor {
    /// Creates a monitor.
    pub fn new(config: MonitorConfig) -> Self {
        let history = MetricsHistory::new(config.history_max_age, config.history_max_len);
        let thresholds = ThresholdChecker::new(config.thresholds.clone(), config.warning_cooldown);
        Self {
            config,
            aggregate: Mutex::new(Aggregate::default()),
            history: Mutex::new(history),
            thresholds: Mutex::new(thresholds),
            violations: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
        }
    }
}

impl PerformanceMonitor for DefaultPerformanceMonitor {
    fn record(&self, metrics: &OperationMetrics) {
        self.aggregate.lock().add(metrics);
        self.history.lock().push(metrics.clone());

        let (violations, warnings) = self.thresholds.lock().check(metrics, Instant::now());
        self.violations.fetch_add(violations, Ordering::Relaxed);
        self.warnings.fetch_add(warnings, Ordering::Relaxed);
    }

    fn stats(&self) -> PerformanceStats {
        let trend = self.trend();
        let agg = self.aggregate.lock();
        let decided = agg.successes + agg.failures;

        PerformanceStats {
            total_operations: agg.total,
            successes: agg.successes,
            failures: agg.failures,
            cancellations: agg.cancellations,
            success_rate: if decided == 0 {
                0.0
            } else {
                agg.successes as f64 / decided as f64
            },
            avg_resource_load_ms: agg.average_ms(agg.resource_load),
            avg_search_ms: agg.average_ms(agg.search),
            avg_validation_ms: agg.average_ms(agg.validation),
            avg_main_thread_ms: agg.average_ms(agg.main_thread),
            avg_total_ms: agg.average_ms(agg.total_time),
            avg_candidates_checked: if agg.total == 0 {
                0.0
            } else {
                agg.candidates_checked as f64 / agg.total as f64
            },
            avg_efficiency: if agg.successes == 0 {
                0.0
            } else {
                agg.efficiency_sum / agg.successes as f64
            },
            threshold_violations: self.violations.load(Ordering::Relaxed),
            trend,
        }
    }

    fn trend(&self) -> PerformanceTrend {
        self.history.lock().trend(self.config.min_trend_samples)
    }

    fn recent(&self, n: usize) -> Vec<OperationMetrics> {
        self.history.lock().recent(n)
    }

    fn housekeeping(&self) {
        let mut history = self.history.lock();
        let pruned = history.prune(Instant::now());
        if pruned > 0 {
            debug!(pruned, remaining = history.len(), "Pruned metrics history");
        }
    }

    fn threshold_violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    fn warnings_emitted(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

// =============================================================================
// No-op monitor
// =============================================================================

/// Monitor that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl PerformanceMonitor for NoopMonitor {
    fn record(&self, _metrics: &OperationMetrics) {}

    fn stats(&self) -> PerformanceStats {
        PerformanceStats::default()
    }

    fn trend(&self) -> PerformanceTrend {
        PerformanceTrend::InsufficientData
    }

    fn recent(&self, _n: usize) -> Vec<OperationMetrics> {
        Vec::new()
    }

    fn housekeeping(&self) {}

    fn threshold_violations(&self) -> u64 {
        0
    }

    fn warnings_emitted(&self) -> u64 {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
