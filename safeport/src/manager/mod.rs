//! Request manager.
//!
//! Accepts placement requests, enforces one active request per requester,
//! bounds concurrency, and drives each request through the placement
//! pipeline on a tracked worker task.
//!
//! # Architecture
//!
//! ```text
//! submit(requester, center, options)
//!     │
//!     ├─ active[requester] occupied? ──► Err(AlreadyActive)
//!     │
//!     ▼
//! worker task ──► FIFO semaphore ──► pipeline (operation_timeout)
//!     │                                   │
//!     │        cancel(requester) ─────────┤ child token of shutdown
//!     ▼                                   ▼
//! record metrics ──► drop active entry ──► PlacementHandle resolves
//! ```
//!
//! # Invariants
//!
//! - At most one non-terminal request per requester
//! - Active workers never exceed `max_concurrent`; waiters are served FIFO
//! - Every request ends in exactly one terminal state and its tracking entry
//!   is removed before the handle resolves

mod pipeline;
mod request;
mod result;

pub use pipeline::{EXPANSION_FACTOR, MAX_EXPANSIONS};
pub use request::{PlacementRequest, RequestStatus};
pub use result::{PlacementError, PlacementHandle, PlacementOutcome, PlacementResult, SubmitError};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::coord::BlockPos;
use crate::identity::RequesterId;
use crate::loader::RegionLoader;
use crate::monitor::{OperationOutcome, PerformanceMonitor, PerformanceStats};
use crate::options::SearchOptions;
use crate::search::SpiralSearch;
use crate::validator::SafetyValidator;

use pipeline::{PipelineOutcome, PlacementPipeline};

/// Manager counters plus the monitor's aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    /// Requests accepted.
    pub submitted: u64,
    /// Submissions refused.
    pub rejected: u64,
    /// Requests that placed their requester.
    pub completed: u64,
    /// Requests that failed.
    pub failed: u64,
    /// Requests that were cancelled.
    pub cancelled: u64,
    /// Tracked non-terminal requests.
    pub queue_depth: usize,
    /// Requests waiting for a worker slot.
    pub waiting: usize,
    /// Free worker slots.
    pub available_slots: usize,
    /// Whether submissions are accepted.
    pub accepting: bool,
    /// Monitor aggregate.
    pub performance: PerformanceStats,
}

/// What [`RequestManager::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Requests cancelled by the shutdown.
    pub cancelled: usize,
    /// Whether every worker finished within the timeout.
    pub drained: bool,
    /// Workers aborted after the timeout.
    pub aborted: usize,
}

#[derive(Debug)]
struct ActiveEntry {
    request: PlacementRequest,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct ManagerCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

struct ManagerShared {
    pipeline: PlacementPipeline,
    monitor: Arc<dyn PerformanceMonitor>,
    config: ManagerConfig,
    active: DashMap<RequesterId, ActiveEntry>,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    workers: Mutex<Vec<AbortHandle>>,
    shutdown: CancellationToken,
    accepting: AtomicBool,
    counters: ManagerCounters,
}

impl ManagerShared {
    /// Drops the tracking entry if it still belongs to `request`.
    fn untrack(&self, request: &PlacementRequest) {
        let id = request.id();
        self.active
            .remove_if(&request.requester(), |_, entry| entry.request.id() == id);
    }
}

/// Front door of the placement core.
#[derive(Clone)]
pub struct RequestManager {
    shared: Arc<ManagerShared>,
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("config", &self.shared.config)
            .field("queue_depth", &self.shared.active.len())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl RequestManager {
    /// Creates a manager over the three engines.
    pub fn new(
        loader: RegionLoader,
        search: Arc<SpiralSearch>,
        validator: Arc<SafetyValidator>,
        monitor: Arc<dyn PerformanceMonitor>,
        config: ManagerConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            shared: Arc::new(ManagerShared {
                pipeline: PlacementPipeline::new(loader, search, validator, config.clone()),
                monitor,
                config,
                active: DashMap::new(),
                slots,
                tracker: TaskTracker::new(),
                workers: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
                accepting: AtomicBool::new(true),
                counters: ManagerCounters::default(),
            }),
        }
    }

    /// Accepts a request and starts its worker.
    ///
    /// Fails without spawning or tracking anything when called outside a
    /// Tokio runtime, when the requester already has an active request, or
    /// when the manager is shutting down.
    pub fn submit(
        &self,
        requester: RequesterId,
        center: BlockPos,
        options: SearchOptions,
    ) -> Result<PlacementHandle, SubmitError> {
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::Acquire) {
            shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SubmitError::ShuttingDown);
        }
        let Ok(runtime) = Handle::try_current() else {
            shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SubmitError::NoRuntime);
        };

        let request = PlacementRequest::new(requester, center, options);
        let cancel = shared.shutdown.child_token();

        match shared.active.entry(requester) {
            Entry::Occupied(occupied) => {
                shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(requester = %requester, "Request refused: requester already active");
                return Err(SubmitError::AlreadyActive {
                    requester,
                    active: occupied.get().request.id(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ActiveEntry {
                    request: request.clone(),
                    cancel: cancel.clone(),
                });
            }
        }
        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        let task = shared.tracker.spawn_on(
            run_worker(Arc::clone(shared), request.clone(), cancel, tx),
            &runtime,
        );
        {
            let mut workers = shared.workers.lock();
            workers.retain(|handle| !handle.is_finished());
            workers.push(task.abort_handle());
        }

        info!(
            request_id = %request.id(),
            requester = %requester,
            center = %center,
            "Placement request submitted"
        );
        Ok(PlacementHandle::new(request, rx))
    }

    /// Cancels the requester's active request.
    ///
    /// Returns `false` if there was no active request, it had already
    /// reached a terminal state, or the host is already placing the
    /// requester. A placement in progress always runs to completion and is
    /// reported as such.
    pub fn cancel(&self, requester: RequesterId) -> bool {
        let Some((request, token)) = self
            .shared
            .active
            .get(&requester)
            .map(|entry| (entry.request.clone(), entry.cancel.clone()))
        else {
            return false;
        };

        let cancelled = request.cancel();
        if cancelled {
            token.cancel();
            self.shared.untrack(&request);
            info!(request_id = %request.id(), requester = %requester, "Placement request cancelled");
        }
        cancelled
    }

    /// Status of the requester's active request.
    pub fn status(&self, requester: RequesterId) -> Option<RequestStatus> {
        self.shared
            .active
            .get(&requester)
            .map(|entry| entry.request.status())
    }

    /// Tracked non-terminal requests.
    pub fn queue_depth(&self) -> usize {
        self.shared.active.len()
    }

    /// Snapshot of tracked requests.
    pub fn active_requests(&self) -> Vec<PlacementRequest> {
        self.shared
            .active
            .iter()
            .map(|entry| entry.request.clone())
            .collect()
    }

    /// Whether submissions are accepted.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// The monitor's aggregate.
    pub fn performance_stats(&self) -> PerformanceStats {
        self.shared.monitor.stats()
    }

    /// The monitor requests are recorded into.
    pub fn monitor(&self) -> &Arc<dyn PerformanceMonitor> {
        &self.shared.monitor
    }

    /// The loader shared with search and validation.
    pub fn loader(&self) -> &RegionLoader {
        self.shared.pipeline.loader()
    }

    /// The candidate generator.
    pub fn search(&self) -> &Arc<SpiralSearch> {
        self.shared.pipeline.search()
    }

    /// The safety validator.
    pub fn validator(&self) -> &Arc<SafetyValidator> {
        self.shared.pipeline.validator()
    }

    /// Manager counters.
    pub fn stats(&self) -> ManagerStats {
        let shared = &self.shared;
        let c = &shared.counters;
        let waiting = shared
            .active
            .iter()
            .filter(|entry| entry.request.status() == RequestStatus::Queued)
            .count();

        ManagerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            queue_depth: shared.active.len(),
            waiting,
            available_slots: shared.slots.available_permits(),
            accepting: self.is_accepting(),
            performance: shared.monitor.stats(),
        }
    }

    /// Stops intake, cancels every active request, and waits for workers.
    ///
    /// Workers still running after `timeout` are aborted.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let shared = &self.shared;
        shared.accepting.store(false, Ordering::Release);

        let requests: Vec<PlacementRequest> = self.active_requests();
        let mut cancelled = 0;
        for request in &requests {
            if request.cancel() {
                cancelled += 1;
            }
            shared.untrack(request);
        }
        shared.shutdown.cancel();
        shared.tracker.close();

        let drained = tokio::time::timeout(timeout, shared.tracker.wait())
            .await
            .is_ok();

        let mut aborted = 0;
        if !drained {
            for handle in shared.workers.lock().drain(..) {
                if !handle.is_finished() {
                    handle.abort();
                    aborted += 1;
                }
            }
            warn!(aborted, "Placement workers aborted at shutdown");
        }

        info!(cancelled, drained, aborted, "Request manager shut down");
        ShutdownReport {
            cancelled,
            drained,
            aborted,
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Untracks and fails the request if the worker is dropped before finishing.
struct WorkerGuard {
    shared: Arc<ManagerShared>,
    request: PlacementRequest,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.request.fail("placement worker ended unexpectedly") {
            self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.untrack(&self.request);
    }
}

async fn run_worker(
    shared: Arc<ManagerShared>,
    request: PlacementRequest,
    cancel: CancellationToken,
    tx: oneshot::Sender<PlacementResult>,
) {
    let guard = WorkerGuard {
        shared: Arc::clone(&shared),
        request: request.clone(),
    };

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(&shared.slots).acquire_owned() => permit.ok(),
    };

    let mut op = shared.monitor.begin(request.id());
    let outcome = match permit {
        None if shared.shutdown.is_cancelled() && !request.status().is_terminal() => {
            PlacementOutcome::Failed(PlacementError::ShuttingDown)
        }
        None => PlacementOutcome::Cancelled,
        Some(_permit) => {
            if !request.transition(RequestStatus::Processing) {
                PlacementOutcome::Cancelled
            } else {
                debug!(request_id = %request.id(), "Placement request processing");
                let deadline = shared.config.operation_timeout;
                match tokio::time::timeout(
                    deadline,
                    shared.pipeline.run(&request, &cancel, &mut op),
                )
                .await
                {
                    Ok(PipelineOutcome::Placed {
                        position,
                        final_options,
                    }) => PlacementOutcome::Placed {
                        position,
                        final_options,
                    },
                    Ok(PipelineOutcome::Exhausted { expansions }) => {
                        PlacementOutcome::Failed(PlacementError::NoSafeLocation { expansions })
                    }
                    Ok(PipelineOutcome::PlacementTimedOut { elapsed }) => {
                        PlacementOutcome::Failed(PlacementError::Timeout { elapsed })
                    }
                    Ok(PipelineOutcome::Rejected(reason)) => {
                        PlacementOutcome::Failed(PlacementError::PlacementRejected(reason))
                    }
                    Ok(PipelineOutcome::Cancelled) => PlacementOutcome::Cancelled,
                    Err(_) => {
                        warn!(
                            request_id = %request.id(),
                            timeout_ms = deadline.as_millis() as u64,
                            "Placement operation timed out"
                        );
                        PlacementOutcome::Failed(PlacementError::Timeout { elapsed: deadline })
                    }
                }
            }
        }
    };

    let outcome = settle(&shared, &request, outcome);
    let (op_outcome, reason) = match &outcome {
        PlacementOutcome::Placed { .. } => (OperationOutcome::Success, None),
        PlacementOutcome::Failed(error) => (OperationOutcome::Failure, Some(error.to_string())),
        PlacementOutcome::Cancelled => (OperationOutcome::Cancelled, None),
    };
    let attempts_used = op.candidates_checked();
    let search_phases = op.search_phases();
    let memory = shared.pipeline.loader().world().memory_usage_bytes();
    let metrics = op.finish(op_outcome, reason, memory);
    shared.monitor.record(&metrics);

    shared.untrack(&request);
    drop(guard);

    let result = PlacementResult {
        request_id: request.id(),
        requester: request.requester(),
        status: request.status(),
        outcome,
        elapsed: request.created_at().elapsed(),
        attempts_used,
        search_phases,
    };
    info!(
        request_id = %result.request_id,
        requester = %result.requester,
        status = %result.status,
        position = ?result.position(),
        attempts = attempts_used,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Placement request finished"
    );
    // The caller may have dropped the handle.
    let _ = tx.send(result);
}

/// Moves the request to the terminal state matching `outcome`.
///
/// A concurrent cancel wins: if the request is already terminal, the
/// outcome is rewritten to match it.
fn settle(
    shared: &ManagerShared,
    request: &PlacementRequest,
    outcome: PlacementOutcome,
) -> PlacementOutcome {
    let counters = &shared.counters;
    let applied = match &outcome {
        PlacementOutcome::Placed { position, .. } => request.complete(*position),
        PlacementOutcome::Failed(error) => request.fail(error.to_string()),
        PlacementOutcome::Cancelled => request.cancel() || request.status() == RequestStatus::Cancelled,
    };

    let outcome = if applied {
        outcome
    } else {
        match request.status() {
            RequestStatus::Cancelled => PlacementOutcome::Cancelled,
            RequestStatus::Failed => PlacementOutcome::Failed(PlacementError::Internal(
                request
                    .failure_reason()
                    .unwrap_or_else(|| "request failed".to_string()),
            )),
            _ => outcome,
        }
    };

    match &outcome {
        PlacementOutcome::Placed { .. } => counters.completed.fetch_add(1, Ordering::Relaxed),
        PlacementOutcome::Failed(_) => counters.failed.fetch_add(1, Ordering::Relaxed),
        PlacementOutcome::Cancelled => counters.cancelled.fetch_add(1, Ordering::Relaxed),
    };
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoaderConfig, MonitorConfig, SearchConfig, ValidatorConfig};
    use crate::monitor::DefaultPerformanceMonitor;
    use crate::world::synthetic::SyntheticWorld;
    use crate::identity::RequestId;
    use crate::world::{MaterialClass, WorldProvider};

    fn tracked_ids(manager: &RequestManager) -> Vec<RequestId> {
        manager
            .shared
            .active
            .iter()
            .map(|entry| entry.request.id())
            .collect()
    }

    fn manager_over(world: Arc<SyntheticWorld>, config: ManagerConfig) -> RequestManager {
        let loader = RegionLoader::new(world as Arc<dyn WorldProvider>, LoaderConfig::default());
        let search = SpiralSearch::new(
            loader.clone(),
            SearchConfig {
                seed: Some(11),
                ..SearchConfig::default()
            },
        );
        let validator = SafetyValidator::new(loader.clone(), ValidatorConfig::default());
        RequestManager::new(
            loader,
            Arc::new(search),
            Arc::new(validator),
            Arc::new(DefaultPerformanceMonitor::new(MonitorConfig::default())),
            config,
        )
    }

    fn options() -> SearchOptions {
        SearchOptions::builder()
            .min_radius(20)
            .max_radius(60)
            .max_attempts(8)
            .build()
            .unwrap()
    }

    fn center() -> BlockPos {
        BlockPos::new(0, 64, 0)
    }

    #[tokio::test]
    async fn test_successful_placement() {
        let world = Arc::new(SyntheticWorld::flat(64));
        let manager = manager_over(world.clone(), ManagerConfig::default());
        let requester = RequesterId::random();

        let handle = manager.submit(requester, center(), options()).unwrap();
        let result = handle.await;

        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.status, RequestStatus::Completed);
        assert_eq!(result.search_phases, 1);
        assert!(result.attempts_used >= 1);
        assert_eq!(manager.queue_depth(), 0);
        assert_eq!(manager.status(requester), None);
        assert_eq!(world.placements(), vec![(requester, result.position().unwrap())]);
        assert_eq!(manager.stats().completed, 1);
        assert_eq!(manager.performance_stats().successes, 1);
    }

    #[tokio::test]
    async fn test_second_submission_rejected_while_active() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_load_latency(Duration::from_millis(50)),
        );
        let manager = manager_over(world, ManagerConfig::default());
        let requester = RequesterId::random();

        let first = manager.submit(requester, center(), options()).unwrap();
        let second = manager.submit(requester, center(), options());

        match second {
            Err(SubmitError::AlreadyActive { active, .. }) => assert_eq!(active, first.request_id()),
            other => panic!("expected AlreadyActive, got {other:?}"),
        }
        assert_eq!(manager.queue_depth(), 1);
        assert_eq!(tracked_ids(&manager), vec![first.request_id()]);

        first.await;
        assert!(manager.submit(requester, center(), options()).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_pickup() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_load_latency(Duration::from_millis(200)),
        );
        let manager = manager_over(
            world,
            ManagerConfig {
                max_concurrent: 1,
                ..ManagerConfig::default()
            },
        );
        let busy = manager
            .submit(RequesterId::random(), center(), options())
            .unwrap();
        let waiting_requester = RequesterId::random();
        let waiting = manager
            .submit(waiting_requester, center(), options())
            .unwrap();
        tokio::task::yield_now().await;

        assert_eq!(manager.status(waiting_requester), Some(RequestStatus::Queued));
        assert!(manager.cancel(waiting_requester));
        assert!(!manager.cancel(waiting_requester));

        let result = waiting.await;
        assert!(result.is_cancelled());
        assert_eq!(result.status, RequestStatus::Cancelled);
        assert_eq!(result.attempts_used, 0);

        assert!(busy.await.status.is_terminal());
        assert_eq!(manager.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_placement_keeps_completion() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_place_latency(Duration::from_millis(200)),
        );
        let manager = manager_over(world.clone(), ManagerConfig::default());
        let requester = RequesterId::random();
        let handle = manager.submit(requester, center(), options()).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.status() != RequestStatus::Teleporting {
            assert!(tokio::time::Instant::now() < deadline, "never reached teleporting");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!manager.cancel(requester));
        let result = handle.await;

        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.status, RequestStatus::Completed);
        assert_eq!(world.placements().len(), 1);
        assert_eq!(manager.stats().cancelled, 0);
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_placement_finish() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_place_latency(Duration::from_millis(100)),
        );
        let manager = manager_over(world.clone(), ManagerConfig::default());
        let handle = manager
            .submit(RequesterId::random(), center(), options())
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.status() != RequestStatus::Teleporting {
            assert!(tokio::time::Instant::now() < deadline, "never reached teleporting");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = manager.shutdown(Duration::from_secs(5)).await;

        assert!(report.drained);
        assert_eq!(report.cancelled, 0);
        assert_eq!(handle.await.status, RequestStatus::Completed);
        assert_eq!(world.placements().len(), 1);
    }

    #[test]
    fn test_submit_outside_runtime_leaves_no_trace() {
        let manager = manager_over(Arc::new(SyntheticWorld::flat(64)), ManagerConfig::default());
        let requester = RequesterId::random();

        assert_eq!(
            manager.submit(requester, center(), options()).unwrap_err(),
            SubmitError::NoRuntime
        );
        assert_eq!(manager.queue_depth(), 0);
        assert_eq!(manager.status(requester), None);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(async {
            manager
                .submit(requester, center(), options())
                .unwrap()
                .await
        });
        assert!(result.is_success(), "{result:?}");
    }

    #[tokio::test]
    async fn test_cancel_unknown_requester() {
        let manager = manager_over(Arc::new(SyntheticWorld::flat(64)), ManagerConfig::default());
        assert!(!manager.cancel(RequesterId::random()));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_no_safe_location() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_terrain_override(|pos| {
                (pos.y == 64).then_some(MaterialClass::Lava)
            }),
        );
        let manager = manager_over(world.clone(), ManagerConfig::default());

        let result = manager
            .submit(RequesterId::random(), center(), options())
            .unwrap()
            .await;

        assert_eq!(result.status, RequestStatus::Failed);
        assert!(result
            .failure_reason()
            .unwrap()
            .contains("no safe location"));
        assert_eq!(result.search_phases, MAX_EXPANSIONS + 1);
        assert!(world.placements().is_empty());
        assert_eq!(manager.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_requests() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_load_latency(Duration::from_millis(100)),
        );
        let manager = manager_over(world, ManagerConfig::default());
        let handle = manager
            .submit(RequesterId::random(), center(), options())
            .unwrap();

        let report = manager.shutdown(Duration::from_secs(5)).await;

        assert!(report.drained);
        assert_eq!(report.cancelled, 1);
        assert!(!manager.is_accepting());
        assert!(matches!(
            manager.submit(RequesterId::random(), center(), options()),
            Err(SubmitError::ShuttingDown)
        ));
        assert!(handle.await.is_cancelled());
        assert_eq!(manager.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_load_latency(Duration::from_millis(30)),
        );
        let manager = manager_over(
            world,
            ManagerConfig {
                max_concurrent: 2,
                ..ManagerConfig::default()
            },
        );

        let handles: Vec<_> = (0..5)
            .map(|_| {
                manager
                    .submit(RequesterId::random(), center(), options())
                    .unwrap()
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let processing = manager
            .active_requests()
            .iter()
            .filter(|r| r.status() != RequestStatus::Queued)
            .count();
        assert!(processing <= 2);

        for result in futures::future::join_all(handles).await {
            assert!(result.status.is_terminal());
        }
        assert_eq!(manager.stats().available_slots, 2);
    }
}
