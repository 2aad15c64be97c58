//! Task state machine for the broker.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> InFlight -> Acked
/// - Pending -> InFlight -> RetryScheduled -> InFlight ... (until max_attempts)
/// - Pending -> InFlight -> DeadLettered (retries exhausted or permanent failure)
/// - Pending | RetryScheduled -> Cancelled (best-effort cancel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Enqueued; eligible once `not_before` has passed.
    Pending,

    /// Leased by a worker until the visibility timeout.
    InFlight,

    /// Waiting for backoff before the next delivery.
    RetryScheduled,

    /// Successfully handled.
    Acked,

    /// Gave up; kept for operator inspection.
    DeadLettered,

    /// Cancelled before any worker picked it up.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Acked | TaskState::DeadLettered | TaskState::Cancelled
        )
    }

    /// Waiting in the schedule (eligible for dequeue once due)?
    pub fn is_waiting(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::RetryScheduled)
    }
}
