//! Per-operation metrics.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::identity::RequestId;

/// Timed phase of a placement operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Waiting for region loads.
    ResourceLoad,
    /// Generating candidates.
    Search,
    /// Judging candidates.
    Validation,
    /// The host's placement action.
    MainThread,
}

impl Phase {
    /// All phases in reporting order.
    pub const ALL: [Phase; 4] = [
        Phase::ResourceLoad,
        Phase::Search,
        Phase::Validation,
        Phase::MainThread,
    ];

    fn index(self) -> usize {
        match self {
            Phase::ResourceLoad => 0,
            Phase::Search => 1,
            Phase::Validation => 2,
            Phase::MainThread => 3,
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationOutcome {
    /// The requester was placed.
    Success,
    /// The operation failed.
    Failure,
    /// The operation was cancelled. Kept out of the success rate.
    Cancelled,
}

/// Immutable record of one finished operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetrics {
    /// Request measured.
    pub request_id: RequestId,
    /// When processing started.
    pub started_at: Instant,
    /// When processing ended.
    pub finished_at: Instant,
    /// Time spent waiting for region loads.
    pub resource_load: Duration,
    /// Time spent generating candidates.
    pub search: Duration,
    /// Time spent judging candidates.
    pub validation: Duration,
    /// Time spent in the host's placement action.
    pub main_thread: Duration,
    /// Regions made available.
    pub regions_loaded: u32,
    /// Candidates taken through the pipeline.
    pub candidates_checked: u32,
    /// Search passes run (one per radius band).
    pub search_phases: u32,
    /// How the operation ended.
    pub outcome: OperationOutcome,
    /// Failure reason, if any.
    pub failure_reason: Option<String>,
    /// Host memory figure at completion, if reported.
    pub memory_bytes: Option<u64>,
}

impl OperationMetrics {
    /// Wall-clock time of the operation.
    pub fn total_time(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    /// Duration of one phase.
    pub fn phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::ResourceLoad => self.resource_load,
            Phase::Search => self.search,
            Phase::Validation => self.validation,
            Phase::MainThread => self.main_thread,
        }
    }

    /// Whether the requester was placed.
    pub fn is_success(&self) -> bool {
        self.outcome == OperationOutcome::Success
    }

    /// 100 for a first-candidate success, dropping with each extra candidate.
    ///
    /// Zero for anything but success.
    pub fn efficiency_score(&self) -> f64 {
        if self.is_success() {
            100.0 / self.candidates_checked.max(1) as f64
        } else {
            0.0
        }
    }
}

/// Accumulates timings and counts while an operation runs.
///
/// Owned by the operation; handed to the monitor only once finished.
#[derive(Debug, Clone)]
pub struct OperationMonitor {
    request_id: RequestId,
    started_at: Instant,
    phases: [Duration; 4],
    regions_loaded: u32,
    candidates_checked: u32,
    search_phases: u32,
}

impl OperationMonitor {
    /// Starts measuring an operation.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            phases: [Duration::ZERO; 4],
            regions_loaded: 0,
            candidates_checked: 0,
            search_phases: 0,
        }
    }

    /// Request being measured.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Adds time to a phase.
    pub fn add_phase(&mut self, phase: Phase, duration: Duration) {
        let slot = &mut self.phases[phase.index()];
        *slot = slot.saturating_add(duration);
    }

    /// Awaits `future` and charges its duration to `phase`.
    pub async fn time<F: Future>(&mut self, phase: Phase, future: F) -> F::Output {
        let started = Instant::now();
        let output = future.await;
        self.add_phase(phase, started.elapsed());
        output
    }

    /// Time accumulated by a phase so far.
    pub fn phase(&self, phase: Phase) -> Duration {
        self.phases[phase.index()]
    }

    /// Counts a region made available.
    pub fn region_loaded(&mut self) {
        self.regions_loaded = self.regions_loaded.saturating_add(1);
    }

    /// Counts a candidate taken through the pipeline.
    pub fn candidate_checked(&mut self) {
        self.candidates_checked = self.candidates_checked.saturating_add(1);
    }

    /// Counts a search pass.
    pub fn search_phase(&mut self) {
        self.search_phases = self.search_phases.saturating_add(1);
    }

    /// Candidates checked so far.
    pub fn candidates_checked(&self) -> u32 {
        self.candidates_checked
    }

    /// Search passes so far.
    pub fn search_phases(&self) -> u32 {
        self.search_phases
    }

    /// Time since the operation started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Freezes the measurements.
    pub fn finish(
        self,
        outcome: OperationOutcome,
        failure_reason: Option<String>,
        memory_bytes: Option<u64>,
    ) -> OperationMetrics {
        OperationMetrics {
            request_id: self.request_id,
            started_at: self.started_at,
            finished_at: Instant::now(),
            resource_load: self.phases[Phase::ResourceLoad.index()],
            search: self.phases[Phase::Search.index()],
            validation: self.phases[Phase::Validation.index()],
            main_thread: self.phases[Phase::MainThread.index()],
            regions_loaded: self.regions_loaded,
            candidates_checked: self.candidates_checked,
            search_phases: self.search_phases,
            outcome,
            failure_reason,
            memory_bytes,
        }
    }
}
