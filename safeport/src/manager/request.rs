//! Placement requests and their lifecycle.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::coord::BlockPos;
use crate::identity::{RequestId, RequesterId};
use crate::options::SearchOptions;

/// Lifecycle state of a request.
///
/// ```text
/// Queued ──► Processing ──► Teleporting ──► Completed
///    │            │              │
///    │            │              └────────► Failed
///    └────────────┴───────────────────────► Failed | Cancelled
/// ```
///
/// Once the host has started moving the requester the request can no
/// longer be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    /// Waiting for a worker slot.
    Queued,
    /// Searching and validating.
    Processing,
    /// The host is performing the placement.
    Teleporting,
    /// The requester was placed.
    Completed,
    /// No placement happened.
    Failed,
    /// The request was cancelled.
    Cancelled,
}

impl RequestStatus {
    /// Whether the request has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }

    /// Whether the request still occupies its requester's slot.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving to `next` follows the lifecycle.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Queued, Processing) => true,
            (Processing, Teleporting) => true,
            (Teleporting, Completed) => true,
            (Queued | Processing | Teleporting, Failed) => true,
            (Queued | Processing, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Processing => "processing",
            RequestStatus::Teleporting => "teleporting",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
struct RequestState {
    status: RequestStatus,
    position: Option<BlockPos>,
    failure_reason: Option<String>,
}

#[derive(Debug)]
struct RequestInner {
    id: RequestId,
    requester: RequesterId,
    center: BlockPos,
    options: SearchOptions,
    created_at: Instant,
    state: Mutex<RequestState>,
}

/// One placement request.
///
/// Identity and options are immutable; status, result position and failure
/// reason change under a lock. Terminal states are final. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    inner: Arc<RequestInner>,
}

impl PlacementRequest {
    /// Creates a queued request.
    pub fn new(requester: RequesterId, center: BlockPos, options: SearchOptions) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: RequestId::new(),
                requester,
                center,
                options,
                created_at: Instant::now(),
                state: Mutex::new(RequestState {
                    status: RequestStatus::Queued,
                    position: None,
                    failure_reason: None,
                }),
            }),
        }
    }

    /// Request id.
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// Entity to place.
    pub fn requester(&self) -> RequesterId {
        self.inner.requester
    }

    /// Center of the search.
    pub fn center(&self) -> BlockPos {
        self.inner.center
    }

    /// Options as submitted.
    pub fn options(&self) -> &SearchOptions {
        &self.inner.options
    }

    /// When the request was submitted.
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Current status.
    pub fn status(&self) -> RequestStatus {
        self.inner.state.lock().status
    }

    /// Destination, once completed.
    pub fn result_position(&self) -> Option<BlockPos> {
        self.inner.state.lock().position
    }

    /// Failure reason, once failed.
    pub fn failure_reason(&self) -> Option<String> {
        self.inner.state.lock().failure_reason.clone()
    }

    /// Moves to `next` if the lifecycle allows it.
    pub fn transition(&self, next: RequestStatus) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.can_transition_to(next) {
            state.status = next;
            true
        } else {
            false
        }
    }

    /// Marks the request completed at `position`.
    pub fn complete(&self, position: BlockPos) -> bool {
        let mut state = self.inner.state.lock();
        if !state.status.can_transition_to(RequestStatus::Completed) {
            return false;
        }
        state.status = RequestStatus::Completed;
        state.position = Some(position);
        true
    }

    /// Marks the request failed.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let mut state = self.inner.state.lock();
        if !state.status.can_transition_to(RequestStatus::Failed) {
            return false;
        }
        state.status = RequestStatus::Failed;
        state.failure_reason = Some(reason.into());
        true
    }

    /// Marks the request cancelled.
    ///
    /// Returns false if the request is terminal or already teleporting.
    pub fn cancel(&self) -> bool {
        self.transition(RequestStatus::Cancelled)
    }

    /// Whether both handles point at the same request.
    pub fn same_request(&self, other: &PlacementRequest) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlacementRequest {
        PlacementRequest::new(
            RequesterId::random(),
            BlockPos::new(0, 64, 0),
            SearchOptions::default(),
        )
    }

    #[test]
    fn test_new_request_is_queued() {
        let request = request();
        assert_eq!(request.status(), RequestStatus::Queued);
        assert!(request.status().is_active());
    }

    #[test]
    fn test_happy_path() {
        let request = request();
        assert!(request.transition(RequestStatus::Processing));
        assert!(request.transition(RequestStatus::Teleporting));
        assert!(request.complete(BlockPos::new(5, 64, 5)));

        assert_eq!(request.status(), RequestStatus::Completed);
        assert_eq!(request.result_position(), Some(BlockPos::new(5, 64, 5)));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let request = request();
        assert!(request.cancel());
        assert!(!request.transition(RequestStatus::Processing));
        assert!(!request.fail("late"));
        assert!(!request.cancel());
        assert_eq!(request.status(), RequestStatus::Cancelled);
        assert_eq!(request.failure_reason(), None);
    }

    #[test]
    fn test_cannot_skip_processing() {
        let request = request();
        assert!(!request.transition(RequestStatus::Teleporting));
        assert!(!request.complete(BlockPos::new(0, 0, 0)));
    }

    #[test]
    fn test_teleporting_request_cannot_be_cancelled() {
        let request = request();
        assert!(request.transition(RequestStatus::Processing));
        assert!(request.transition(RequestStatus::Teleporting));

        assert!(!request.cancel());
        assert!(request.complete(BlockPos::new(1, 64, 1)));
        assert_eq!(request.status(), RequestStatus::Completed);
    }

    #[test]
    fn test_teleporting_request_can_still_fail() {
        let request = request();
        assert!(request.transition(RequestStatus::Processing));
        assert!(request.transition(RequestStatus::Teleporting));

        assert!(request.fail("host refused"));
        assert_eq!(request.status(), RequestStatus::Failed);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Teleporting.is_terminal());
    }

    #[test]
    fn test_clones_share_state() {
        let request = request();
        let clone = request.clone();
        clone.fail("boom");

        assert!(request.same_request(&clone));
        assert_eq!(request.failure_reason().as_deref(), Some("boom"));
    }
}
