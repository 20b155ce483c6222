//! Threshold checks with rate-limited warnings.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use super::metrics::{OperationMetrics, Phase};
use crate::config::MonitorThresholds;

/// Ceiling that an operation exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ThresholdKind {
    /// Time spent loading regions.
    ResourceLoad,
    /// Time spent searching.
    Search,
    /// Time spent validating.
    Validation,
    /// Time spent in the host's placement action.
    MainThread,
    /// Whole operation.
    Total,
    /// Host memory figure.
    Memory,
}

impl ThresholdKind {
    fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::ResourceLoad => ThresholdKind::ResourceLoad,
            Phase::Search => ThresholdKind::Search,
            Phase::Validation => ThresholdKind::Validation,
            Phase::MainThread => ThresholdKind::MainThread,
        }
    }
}

/// Compares metrics against ceilings and warns at most once per cooldown per kind.
#[derive(Debug)]
pub(crate) struct ThresholdChecker {
    thresholds: MonitorThresholds,
    cooldown: Duration,
    last_warned: HashMap<ThresholdKind, Instant>,
}

impl ThresholdChecker {
    pub(crate) fn new(thresholds: MonitorThresholds, cooldown: Duration) -> Self {
        Self {
            thresholds,
            cooldown,
            last_warned: HashMap::new(),
        }
    }

    /// Every ceiling the operation exceeded.
    pub(crate) fn violations(&self, metrics: &OperationMetrics) -> Vec<ThresholdKind> {
        let mut exceeded = Vec::new();
        for phase in Phase::ALL {
            if metrics.phase(phase) > self.limit(phase) {
                exceeded.push(ThresholdKind::for_phase(phase));
            }
        }
        if metrics.total_time() > self.thresholds.total {
            exceeded.push(ThresholdKind::Total);
        }
        if let (Some(limit), Some(used)) = (self.thresholds.memory_bytes, metrics.memory_bytes) {
            if used > limit {
                exceeded.push(ThresholdKind::Memory);
            }
        }
        exceeded
    }

    /// Checks the metrics and logs warnings outside the cooldown.
    ///
    /// Returns `(violations, warnings_emitted)`.
    pub(crate) fn check(&mut self, metrics: &OperationMetrics, now: Instant) -> (u64, u64) {
        let exceeded = self.violations(metrics);
        let mut warned = 0;

        for kind in &exceeded {
            let cooling = self
                .last_warned
                .get(kind)
                .is_some_and(|last| now.saturating_duration_since(*last) < self.cooldown);
            if cooling {
                continue;
            }
            self.last_warned.insert(*kind, now);
            warned += 1;
            warn!(
                request_id = %metrics.request_id,
                threshold = ?kind,
                total_ms = metrics.total_time().as_millis() as u64,
                resource_load_ms = metrics.resource_load.as_millis() as u64,
                search_ms = metrics.search.as_millis() as u64,
                validation_ms = metrics.validation.as_millis() as u64,
                main_thread_ms = metrics.main_thread.as_millis() as u64,
                memory_bytes = metrics.memory_bytes,
                "Placement performance threshold exceeded"
            );
        }

        (exceeded.len() as u64, warned)
    }

    fn limit(&self, phase: Phase) -> Duration {
        match phase {
            Phase::ResourceLoad => self.thresholds.resource_load,
            Phase::Search => self.thresholds.search,
            Phase::Validation => self.thresholds.validation,
            Phase::MainThread => self.thresholds.main_thread,
        }
    }
}
