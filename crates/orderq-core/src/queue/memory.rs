//! In-memory broker implementation.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use super::{
    Broker, BrokerError, DeadLetter, FailDisposition, FailReason, Lease, RetryPolicy, TaskRecord,
    TaskState, VisibilityPolicy,
};
use crate::domain::{NewTask, TaskEnvelope, TaskId};
use crate::observability::QueueCounts;
use crate::ports::{Clock, IdGenerator};

const VISIBILITY_EXPIRED: &str = "visibility timeout expired";

/// Broker tuning.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub max_attempts: u32,
    pub retry: RetryPolicy,
    pub visibility: VisibilityPolicy,
    /// How long acked, cancelled and dead-lettered records stay readable
    /// through `Broker::get` before they are dropped. Their totals stay in
    /// `counts()`; dead letters stay in `dead_letters()`.
    pub retention: Duration,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry: RetryPolicy::default(),
            visibility: VisibilityPolicy::default(),
            retention: Duration::from_secs(3600),
        }
    }
}

/// Running totals of tasks that reached a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedTotals {
    pub acked: usize,
    pub cancelled: usize,
    pub dead_lettered: usize,
}

/// Serializable image of the broker, used to carry pending work across a
/// process restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub records: Vec<TaskRecord>,
    pub dead_letters: Vec<DeadLetter>,
    #[serde(default)]
    pub finished: FinishedTotals,
}

/// Heap entry ordered by a deadline.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap (earliest first);
/// `seq` keeps FIFO order among equal deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Deadline {
    at: DateTime<Utc>,
    seq: u64,
    task_id: TaskId,
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering: earlier times have higher priority
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn deadline_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// In-memory broker state.
///
/// Heap entries are hints: each one is validated against the record before use,
/// so cancelled or re-leased tasks simply leave stale entries behind.
struct BrokerState {
    /// Live task records plus finished ones still inside the retention window.
    records: HashMap<TaskId, TaskRecord>,

    /// Waiting tasks ordered by `not_before`.
    scheduled: BinaryHeap<Deadline>,

    /// In-flight tasks ordered by visibility deadline.
    leases: BinaryHeap<Deadline>,

    /// Finished tasks ordered by when their record is dropped.
    retired: BinaryHeap<Deadline>,

    dead_letters: Vec<DeadLetter>,

    finished: FinishedTotals,

    retention: Duration,

    next_seq: u64,
}

impl BrokerState {
    fn new(retention: Duration) -> Self {
        Self {
            records: HashMap::new(),
            scheduled: BinaryHeap::new(),
            leases: BinaryHeap::new(),
            retired: BinaryHeap::new(),
            dead_letters: Vec::new(),
            finished: FinishedTotals::default(),
            retention,
            next_seq: 0,
        }
    }

    fn schedule(&mut self, task_id: TaskId, at: DateTime<Utc>) {
        let seq = self.bump_seq();
        self.scheduled.push(Deadline { at, seq, task_id });
    }

    fn track_lease(&mut self, task_id: TaskId, at: DateTime<Utc>) {
        let seq = self.bump_seq();
        self.leases.push(Deadline { at, seq, task_id });
    }

    fn schedule_purge(&mut self, task_id: TaskId, finished_at: DateTime<Utc>) {
        let at = deadline_after(finished_at, self.retention);
        let seq = self.bump_seq();
        self.retired.push(Deadline { at, seq, task_id });
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Count a record that just reached a terminal state and queue it for
    /// removal once the retention window passes.
    fn retire(&mut self, task_id: TaskId, now: DateTime<Utc>) {
        let Some(state) = self.records.get(&task_id).map(|record| record.state) else {
            return;
        };
        match state {
            TaskState::Acked => self.finished.acked += 1,
            TaskState::Cancelled => self.finished.cancelled += 1,
            TaskState::DeadLettered => self.finished.dead_lettered += 1,
            TaskState::Pending | TaskState::InFlight | TaskState::RetryScheduled => return,
        }
        self.schedule_purge(task_id, now);
    }

    /// Drop finished records whose retention window has passed.
    fn purge_retired(&mut self, now: DateTime<Utc>) {
        while self.retired.peek().is_some_and(|entry| entry.at <= now) {
            let Some(entry) = self.retired.pop() else {
                break;
            };
            let finished = self
                .records
                .get(&entry.task_id)
                .is_some_and(|record| record.state.is_terminal());
            if finished {
                self.records.remove(&entry.task_id);
            }
        }
    }

    /// Move a failed record to the dead-letter set. Only ever called from the
    /// InFlight state, so each task is dead-lettered at most once.
    fn dead_letter(&mut self, task_id: TaskId, now: DateTime<Utc>) -> Option<u32> {
        let record = self.records.get_mut(&task_id)?;
        record.mark_dead(now);
        let dead = DeadLetter::from_record(record, now);
        tracing::error!(
            task_id = %dead.task_id,
            task_type = %dead.task_type,
            attempts = dead.attempts,
            last_error = %dead.last_error,
            "task dead-lettered"
        );
        let attempts = dead.attempts;
        self.dead_letters.push(dead);
        self.retire(task_id, now);
        Some(attempts)
    }

    /// Return expired leases to the schedule. Each expiry counts as a failed
    /// delivery.
    fn reclaim_expired(&mut self, now: DateTime<Utc>) {
        while let Some(entry) = self.leases.peek() {
            if entry.at > now {
                break;
            }
            let Some(entry) = self.leases.pop() else {
                break;
            };
            let Some(record) = self.records.get_mut(&entry.task_id) else {
                continue;
            };
            let current = record
                .lease
                .as_ref()
                .is_some_and(|lease| lease.visible_until == entry.at);
            if !current || !record.lease_expired(now) {
                continue;
            }

            let (lease_id, worker_id) = match record.lease.as_ref() {
                Some(lease) => (Some(lease.lease_id), lease.worker_id.clone()),
                None => (None, String::new()),
            };
            let attempt = record.record_failure(VISIBILITY_EXPIRED, now);
            tracing::warn!(
                task_id = %entry.task_id,
                task_type = %record.task_type(),
                lease_id = ?lease_id,
                worker_id = %worker_id,
                attempt,
                "lease expired; reclaiming task"
            );

            if record.retries_exhausted() {
                self.dead_letter(entry.task_id, now);
            } else {
                record.schedule_retry(now, now);
                self.schedule(entry.task_id, now);
            }
        }
    }

    /// Pop the earliest due task, skipping stale heap entries.
    fn next_due(&mut self, now: DateTime<Utc>) -> Option<TaskId> {
        while let Some(entry) = self.scheduled.peek() {
            if entry.at > now {
                return None; // Heap is sorted, so we can stop
            }
            let entry = self.scheduled.pop()?;
            let live = self
                .records
                .get(&entry.task_id)
                .is_some_and(|record| record.is_due(now) && record.not_before == entry.at);
            if live {
                return Some(entry.task_id);
            }
        }
        None
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            acked: self.finished.acked,
            dead_lettered: self.finished.dead_lettered,
            cancelled: self.finished.cancelled,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::InFlight => counts.in_flight += 1,
                TaskState::RetryScheduled => counts.retry_scheduled += 1,
                TaskState::Acked | TaskState::DeadLettered | TaskState::Cancelled => {}
            }
        }
        counts
    }
}

/// In-memory broker.
///
/// All timing goes through the injected `Clock`, so tests drive delays and
/// lease expiry with a `ManualClock`.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    options: BrokerOptions,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryBroker {
    pub fn new(options: BrokerOptions, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(BrokerState::new(options.retention)),
            notify: Notify::new(),
            options,
            clock,
            ids,
        }
    }

    /// Rebuild a broker from a snapshot. In-flight tasks keep their lease and
    /// are reclaimed once it expires.
    pub fn restore(
        snapshot: BrokerSnapshot,
        options: BrokerOptions,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let mut state = BrokerState::new(options.retention);
        for record in snapshot.records {
            let task_id = record.task_id();
            match record.state {
                TaskState::Pending | TaskState::RetryScheduled => {
                    state.schedule(task_id, record.not_before);
                }
                TaskState::InFlight => {
                    if let Some(lease) = &record.lease {
                        state.track_lease(task_id, lease.visible_until);
                    }
                }
                TaskState::Acked | TaskState::DeadLettered | TaskState::Cancelled => {
                    state.schedule_purge(task_id, record.updated_at);
                }
            }
            state.records.insert(task_id, record);
        }
        state.dead_letters = snapshot.dead_letters;
        state.finished = snapshot.finished;
        tracing::info!(
            tasks = state.records.len(),
            dead_letters = state.dead_letters.len(),
            "broker restored from snapshot"
        );

        Self {
            state: Mutex::new(state),
            notify: Notify::new(),
            options,
            clock,
            ids,
        }
    }

    pub async fn snapshot(&self) -> BrokerSnapshot {
        let state = self.state.lock().await;
        let mut records: Vec<TaskRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|record| record.task_id());
        BrokerSnapshot {
            records,
            dead_letters: state.dead_letters.clone(),
            finished: state.finished,
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, task: NewTask, delay: Duration) -> Result<TaskId, BrokerError> {
        let now = self.clock.now();
        let task_id = self.ids.generate_task_id();
        let not_before = deadline_after(now, delay);
        let max_attempts = task
            .max_attempts
            .unwrap_or(self.options.max_attempts)
            .max(1);
        let envelope = TaskEnvelope::new(task_id, task.task_type, task.payload, now);

        tracing::debug!(
            task_id = %task_id,
            task_type = %envelope.task_type(),
            not_before = %not_before,
            max_attempts,
            "task enqueued"
        );

        {
            let mut state = self.state.lock().await;
            state
                .records
                .insert(task_id, TaskRecord::new(envelope, max_attempts, not_before, now));
            state.schedule(task_id, not_before);
        }

        // Notify waiting workers
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<Lease>, BrokerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.reclaim_expired(now);
        state.purge_retired(now);

        let Some(task_id) = state.next_due(now) else {
            return Ok(None);
        };
        let Some(record) = state.records.get_mut(&task_id) else {
            return Ok(None);
        };

        let lease_id = self.ids.generate_lease_id();
        let timeout = self.options.visibility.timeout_for(record.task_type());
        let visible_until = deadline_after(now, timeout);
        record.start_lease(lease_id, worker_id, visible_until, now);
        let lease = Lease {
            lease_id,
            envelope: record.envelope.clone(),
            attempt: record.attempt,
            max_attempts: record.max_attempts,
            worker_id: worker_id.to_string(),
            visible_until,
            visibility_timeout: timeout,
        };
        state.track_lease(task_id, visible_until);

        tracing::debug!(
            task_id = %task_id,
            task_type = %lease.task_type(),
            lease_id = %lease_id,
            worker_id,
            attempt = lease.attempt,
            "task leased"
        );
        Ok(Some(lease))
    }

    async fn ack(&self, lease: &Lease) -> Result<bool, BrokerError> {
        let now = self.clock.now();
        let task_id = lease.task_id();
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&task_id) else {
            tracing::debug!(task_id = %task_id, "ack for unknown task ignored");
            return Ok(false);
        };
        if !record.held_by(lease.lease_id()) {
            tracing::debug!(
                task_id = %task_id,
                lease_id = %lease.lease_id(),
                state = ?record.state,
                "ack ignored; lease no longer holds the task"
            );
            return Ok(false);
        }

        record.mark_acked(now);
        state.retire(task_id, now);
        tracing::debug!(task_id = %task_id, "task acked");
        Ok(true)
    }

    async fn fail(
        &self,
        lease: &Lease,
        reason: FailReason,
    ) -> Result<FailDisposition, BrokerError> {
        let now = self.clock.now();
        let task_id = lease.task_id();
        let disposition = {
            let mut state = self.state.lock().await;
            let Some(record) = state.records.get_mut(&task_id) else {
                return Ok(FailDisposition::Ignored);
            };
            if !record.held_by(lease.lease_id()) {
                tracing::debug!(
                    task_id = %task_id,
                    lease_id = %lease.lease_id(),
                    state = ?record.state,
                    "fail ignored; lease no longer holds the task"
                );
                return Ok(FailDisposition::Ignored);
            }

            let attempt = record.record_failure(reason.message(), now);
            let permanent = matches!(reason, FailReason::Permanent(_));

            if permanent || record.retries_exhausted() {
                state.dead_letter(task_id, now);
                FailDisposition::DeadLettered { attempt }
            } else {
                // Schedule retry with backoff
                let delay = self.options.retry.next_delay(attempt);
                let next_run_at = deadline_after(now, delay);
                record.schedule_retry(next_run_at, now);
                tracing::warn!(
                    task_id = %task_id,
                    task_type = %record.task_type(),
                    attempt,
                    max_attempts = record.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason.message(),
                    "task failed; retry scheduled"
                );
                state.schedule(task_id, next_run_at);
                FailDisposition::RetryScheduled {
                    attempt,
                    next_run_at,
                }
            }
        }; // Lock released here

        if matches!(disposition, FailDisposition::RetryScheduled { .. }) {
            self.notify.notify_one();
        }
        Ok(disposition)
    }

    async fn cancel(&self, task_id: TaskId) -> Result<bool, BrokerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&task_id) else {
            return Ok(false);
        };
        if !record.state.is_waiting() {
            return Ok(false);
        }

        record.mark_cancelled(now);
        state.retire(task_id, now);
        tracing::debug!(task_id = %task_id, "task cancelled");
        Ok(true)
    }

    async fn wait_for_work(&self, max_wait: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {},
            _ = tokio::time::sleep(max_wait) => {},
        }
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&task_id).cloned())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state.dead_letters.clone())
    }

    async fn counts(&self) -> Result<QueueCounts, BrokerError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }
}
