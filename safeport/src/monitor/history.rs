//! Rolling history of finished operations.
//!
//! Keeps recent metrics bounded by age and count, and classifies the trend
//! of operation times by comparing the older half of the window with the
//! newer half.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::metrics::{OperationMetrics, OperationOutcome};

/// Ratio of newer to older average below which the trend is improving.
pub const IMPROVING_RATIO: f64 = 0.9;

/// Ratio of newer to older average above which the trend is degrading.
pub const DEGRADING_RATIO: f64 = 1.1;

/// Direction operation times are moving in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PerformanceTrend {
    /// Operations are getting faster.
    Improving,
    /// Operations are getting slower.
    Degrading,
    /// No significant change.
    Stable,
    /// Too few samples to tell.
    #[default]
    InsufficientData,
}

impl std::fmt::Display for PerformanceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PerformanceTrend::Improving => "improving",
            PerformanceTrend::Degrading => "degrading",
            PerformanceTrend::Stable => "stable",
            PerformanceTrend::InsufficientData => "insufficient data",
        };
        f.write_str(label)
    }
}

/// Bounded window of recent operations.
#[derive(Debug)]
pub(crate) struct MetricsHistory {
    entries: VecDeque<OperationMetrics>,
    max_age: Duration,
    max_len: usize,
}

impl MetricsHistory {
    pub(crate) fn new(max_age: Duration, max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(1024)),
            max_age,
            max_len: max_len.max(1),
        }
    }

    pub(crate) fn push(&mut self, metrics: OperationMetrics) {
        self.entries.push_back(metrics);
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    /// Drops entries older than the maximum age. Returns how many were removed.
    pub(crate) fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.finished_at) > self.max_age {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Most recent `n` entries, newest last.
    pub(crate) fn recent(&self, n: usize) -> Vec<OperationMetrics> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Trend of total operation time over non-cancelled operations.
    pub(crate) fn trend(&self, min_samples: usize) -> PerformanceTrend {
        let samples: Vec<f64> = self
            .entries
            .iter()
            .filter(|m| m.outcome != OperationOutcome::Cancelled)
            .map(|m| m.total_time().as_secs_f64())
            .collect();

        if samples.len() < min_samples.max(2) {
            return PerformanceTrend::InsufficientData;
        }

        let mid = samples.len() / 2;
        let older = mean(&samples[..mid]);
        let newer = mean(&samples[mid..]);
        if older <= f64::EPSILON {
            return PerformanceTrend::Stable;
        }

        let ratio = newer / older;
        if ratio < IMPROVING_RATIO {
            PerformanceTrend::Improving
        } else if ratio > DEGRADING_RATIO {
            PerformanceTrend::Degrading
        } else {
            PerformanceTrend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RequestId;

    fn metrics_with_total(total: Duration) -> OperationMetrics {
        let finished_at = Instant::now();
        OperationMetrics {
            request_id: RequestId::new(),
            started_at: finished_at - total,
            finished_at,
            resource_load: Duration::ZERO,
            search: Duration::ZERO,
            validation: Duration::ZERO,
            main_thread: Duration::ZERO,
            regions_loaded: 0,
            candidates_checked: 1,
            search_phases: 1,
            outcome: OperationOutcome::Success,
            failure_reason: None,
            memory_bytes: None,
        }
    }

    fn history_of(totals_ms: &[u64]) -> MetricsHistory {
        let mut history = MetricsHistory::new(Duration::from_secs(3600), 100);
        for ms in totals_ms {
            history.push(metrics_with_total(Duration::from_millis(*ms)));
        }
        history
    }

    #[test]
    fn test_insufficient_data() {
        let history = history_of(&[10, 10, 10]);
        assert_eq!(history.trend(10), PerformanceTrend::InsufficientData);
    }

    #[test]
    fn test_improving() {
        let history = history_of(&[100, 100, 100, 100, 100, 50, 50, 50, 50, 50]);
        assert_eq!(history.trend(10), PerformanceTrend::Improving);
    }

    #[test]
    fn test_degrading() {
        let history = history_of(&[50, 50, 50, 50, 50, 100, 100, 100, 100, 100]);
        assert_eq!(history.trend(10), PerformanceTrend::Degrading);
    }

    #[test]
    fn test_stable() {
        let history = history_of(&[100, 102, 98, 100, 101, 99, 100, 103, 97, 100]);
        assert_eq!(history.trend(10), PerformanceTrend::Stable);
    }

    #[test]
    fn test_length_bound() {
        let mut history = MetricsHistory::new(Duration::from_secs(3600), 3);
        for _ in 0..10 {
            history.push(metrics_with_total(Duration::from_millis(1)));
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_prune_by_age() {
        let mut history = MetricsHistory::new(Duration::from_secs(1), 10);
        history.push(metrics_with_total(Duration::from_millis(1)));

        assert_eq!(history.prune(Instant::now()), 0);
        assert_eq!(history.prune(Instant::now() + Duration::from_secs(5)), 1);
        assert_eq!(history.len(), 0);
    }

    #[test]
    fn test_recent_returns_newest() {
        let history = history_of(&[1, 2, 3, 4]);
        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].total_time(), Duration::from_millis(4));
    }
}
