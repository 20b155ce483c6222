//! Submission errors, placement results and the result handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;

use super::request::{PlacementRequest, RequestStatus};
use crate::coord::BlockPos;
use crate::identity::{RequestId, RequesterId};
use crate::options::SearchOptions;

/// Why a submission was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The requester already has a non-terminal request.
    #[error("requester {requester} already has an active request ({active})")]
    AlreadyActive {
        requester: RequesterId,
        active: RequestId,
    },

    /// The manager no longer accepts requests.
    #[error("request manager is shutting down")]
    ShuttingDown,

    /// `submit` was called outside a Tokio runtime.
    #[error("placement requests must be submitted from within a Tokio runtime")]
    NoRuntime,
}

/// Why a placement failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// Every radius band was exhausted.
    #[error("no safe location found after {expansions} radius expansions")]
    NoSafeLocation { expansions: u32 },

    /// A deadline passed.
    #[error("placement timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The host refused or failed the placement action.
    #[error("host rejected placement: {0}")]
    PlacementRejected(String),

    /// The manager shut down before the request was processed.
    #[error("request manager is shutting down")]
    ShuttingDown,

    /// The worker ended without reporting.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// The requester was placed.
    Placed {
        /// Destination feet position.
        position: BlockPos,
        /// Options of the radius band that succeeded.
        final_options: SearchOptions,
    },
    /// No placement happened.
    Failed(PlacementError),
    /// The request was cancelled.
    Cancelled,
}

/// What the caller receives when a request ends.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    /// Request id.
    pub request_id: RequestId,
    /// Entity that asked.
    pub requester: RequesterId,
    /// Final status.
    pub status: RequestStatus,
    /// Outcome.
    pub outcome: PlacementOutcome,
    /// Time from submission to completion.
    pub elapsed: Duration,
    /// Candidates taken through the pipeline, across all bands.
    pub attempts_used: u32,
    /// Search passes run.
    pub search_phases: u32,
}

impl PlacementResult {
    /// Whether the requester was placed.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PlacementOutcome::Placed { .. })
    }

    /// Whether the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, PlacementOutcome::Cancelled)
    }

    /// Destination, on success.
    pub fn position(&self) -> Option<BlockPos> {
        match &self.outcome {
            PlacementOutcome::Placed { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Failure, if any.
    pub fn error(&self) -> Option<&PlacementError> {
        match &self.outcome {
            PlacementOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Human-readable failure reason.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            PlacementOutcome::Failed(error) => Some(error.to_string()),
            PlacementOutcome::Cancelled => Some("cancelled".to_string()),
            PlacementOutcome::Placed { .. } => None,
        }
    }
}

/// Future resolving to the request's terminal [`PlacementResult`].
///
/// Dropping the handle does not cancel the request; use
/// [`RequestManager::cancel`](super::RequestManager::cancel).
#[derive(Debug)]
pub struct PlacementHandle {
    request: PlacementRequest,
    submitted_at: Instant,
    rx: oneshot::Receiver<PlacementResult>,
}

impl PlacementHandle {
    pub(crate) fn new(request: PlacementRequest, rx: oneshot::Receiver<PlacementResult>) -> Self {
        Self {
            submitted_at: request.created_at(),
            request,
            rx,
        }
    }

    /// Request id.
    pub fn request_id(&self) -> RequestId {
        self.request.id()
    }

    /// Current status of the request.
    pub fn status(&self) -> RequestStatus {
        self.request.status()
    }

    /// The tracked request.
    pub fn request(&self) -> &PlacementRequest {
        &self.request
    }
}

impl Future for PlacementHandle {
    type Output = PlacementResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                // Worker aborted or panicked before reporting.
                self.request.fail("placement worker ended without a result");
                Poll::Ready(PlacementResult {
                    request_id: self.request.id(),
                    requester: self.request.requester(),
                    status: self.request.status(),
                    outcome: PlacementOutcome::Failed(PlacementError::Internal(
                        "placement worker ended without a result".to_string(),
                    )),
                    elapsed: self.submitted_at.elapsed(),
                    attempts_used: 0,
                    search_phases: 0,
                })
            }
        }
    }
}
