//! Task record: lifecycle metadata + envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskState;
use crate::domain::{LeaseId, TaskEnvelope, TaskId, TaskType};

/// Who holds an in-flight task and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub lease_id: LeaseId,
    pub worker_id: String,
    pub visible_until: DateTime<Utc>,
}

/// Metadata + envelope for a task in the broker.
///
/// Design:
/// - This is the single source of truth for task lifecycle state.
/// - Schedule/lease indexes in the broker hold TaskIds only.
/// - All state transitions happen here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub envelope: TaskEnvelope,
    pub state: TaskState,

    /// Number of failed deliveries so far. Starts at 0.
    pub attempt: u32,

    /// Retry ceiling before dead-lettering.
    pub max_attempts: u32,

    /// Never delivered before this instant.
    pub not_before: DateTime<Utc>,

    pub lease: Option<LeaseInfo>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        envelope: TaskEnvelope,
        max_attempts: u32,
        not_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            envelope,
            state: TaskState::Pending,
            attempt: 0,
            max_attempts,
            not_before,
            lease: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.envelope.task_id()
    }

    pub fn task_type(&self) -> &TaskType {
        self.envelope.task_type()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_waiting() && self.not_before <= now
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::InFlight
            && self
                .lease
                .as_ref()
                .is_some_and(|lease| lease.visible_until <= now)
    }

    /// Whether `lease_id` is the lease currently holding this task.
    pub fn held_by(&self, lease_id: LeaseId) -> bool {
        self.state == TaskState::InFlight
            && self
                .lease
                .as_ref()
                .is_some_and(|lease| lease.lease_id == lease_id)
    }

    /// Mark as in-flight for `worker_id` until `visible_until`.
    pub fn start_lease(
        &mut self,
        lease_id: LeaseId,
        worker_id: impl Into<String>,
        visible_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.state = TaskState::InFlight;
        self.lease = Some(LeaseInfo {
            lease_id,
            worker_id: worker_id.into(),
            visible_until,
        });
        self.updated_at = now;
    }

    pub fn mark_acked(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Acked;
        self.lease = None;
        self.updated_at = now;
    }

    /// Count one failed delivery. Returns the new attempt count.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> u32 {
        self.attempt += 1;
        self.last_error = Some(error.into());
        self.lease = None;
        self.updated_at = now;
        self.attempt
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Schedule the next delivery (backoff or immediate redelivery).
    pub fn schedule_retry(&mut self, not_before: DateTime<Utc>, now: DateTime<Utc>) {
        self.state = TaskState::RetryScheduled;
        self.not_before = not_before;
        self.lease = None;
        self.updated_at = now;
    }

    pub fn mark_dead(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::DeadLettered;
        self.lease = None;
        self.updated_at = now;
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Cancelled;
        self.updated_at = now;
    }
}

/// A task that exhausted its retry budget (or failed permanently).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: String,
    pub dead_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_record(record: &TaskRecord, dead_at: DateTime<Utc>) -> Self {
        Self {
            task_id: record.task_id(),
            task_type: record.task_type().clone(),
            payload: record.envelope.payload().clone(),
            attempts: record.attempt,
            last_error: record.last_error.clone().unwrap_or_default(),
            dead_at,
        }
    }
}
