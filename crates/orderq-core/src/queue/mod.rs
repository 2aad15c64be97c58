//! Queue module: task broker contract, lifecycle state, retry policy and the
//! in-memory broker.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::{BrokerOptions, BrokerSnapshot, FinishedTotals, InMemoryBroker};
pub use record::{DeadLetter, LeaseInfo, TaskRecord};
pub use retry::{RetryPolicy, VisibilityPolicy};
pub use state::TaskState;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{LeaseId, NewTask, TaskEnvelope, TaskId, TaskType};
use crate::observability::QueueCounts;

/// Broker-side failure. Producers see this as a failed enqueue.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode task payload: {0}")]
    Encode(String),
}

/// A task handed to exactly one worker until its visibility deadline.
///
/// The worker must report back with `Broker::ack` or `Broker::fail` passing
/// this lease; if it doesn't, the task becomes visible again once
/// `visible_until` passes. Reports made with a lease that no longer holds the
/// task are ignored.
#[derive(Debug, Clone)]
pub struct Lease {
    lease_id: LeaseId,
    envelope: TaskEnvelope,
    attempt: u32,
    max_attempts: u32,
    worker_id: String,
    visible_until: DateTime<Utc>,
    visibility_timeout: Duration,
}

impl Lease {
    pub fn lease_id(&self) -> LeaseId {
        self.lease_id
    }

    pub fn task_id(&self) -> TaskId {
        self.envelope.task_id()
    }

    pub fn task_type(&self) -> &TaskType {
        self.envelope.task_type()
    }

    pub fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    /// Failed deliveries before this one.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn visible_until(&self) -> DateTime<Utc> {
        self.visible_until
    }

    /// Length of the lease as granted. Handlers should finish well within it.
    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }
}

/// Why a delivery failed. The broker decides retry vs dead-letter from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// Retry with backoff until `max_attempts`.
    Retryable(String),

    /// Dead-letter immediately.
    Permanent(String),
}

impl FailReason {
    pub fn message(&self) -> &str {
        match self {
            FailReason::Retryable(msg) | FailReason::Permanent(msg) => msg,
        }
    }
}

/// What the broker did with a reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailDisposition {
    RetryScheduled {
        attempt: u32,
        next_run_at: DateTime<Utc>,
    },
    DeadLettered {
        attempt: u32,
    },
    /// The lease no longer holds the task (acked, reclaimed and re-leased,
    /// or unknown).
    Ignored,
}

/// Task broker port.
///
/// The in-memory broker is the reference implementation; a durable broker
/// plugs in behind the same trait.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Persist a task that becomes eligible after `delay`.
    async fn enqueue(&self, task: NewTask, delay: Duration) -> Result<TaskId, BrokerError>;

    /// Lease one eligible task to `worker_id`, if any.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<Lease>, BrokerError>;

    /// Mark the task held by `lease` done. Returns `false` (and changes
    /// nothing) when the lease no longer holds the task.
    async fn ack(&self, lease: &Lease) -> Result<bool, BrokerError>;

    /// Report a failed delivery of the task held by `lease`.
    async fn fail(&self, lease: &Lease, reason: FailReason)
        -> Result<FailDisposition, BrokerError>;

    /// Best-effort cancel of a task that has not started. Returns whether it
    /// was cancelled.
    async fn cancel(&self, task_id: TaskId) -> Result<bool, BrokerError>;

    /// Wait until new work may be available, or `max_wait` elapses.
    async fn wait_for_work(&self, max_wait: Duration);

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, BrokerError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BrokerError>;

    /// Observability hook.
    async fn counts(&self) -> Result<QueueCounts, BrokerError>;
}
