//! WorkerPool - タスク実行ループ
//!
//! # フロー
//! 1. `Broker::dequeue()` で lease 取得（無ければ通知 or poll 間隔まで待つ）
//! 2. `Runtime::execute()` で kind tag に応じた handler を実行
//! 3. 成功 → `ack`、失敗 → `fail`（retry / dead-letter は broker が決める）
//!
//! handler の panic も `fail` として broker に返します（lease を失わない）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::runtime::Runtime;
use crate::domain::{Outcome, TaskError, TaskId};
use crate::queue::{Broker, BrokerError, FailDisposition, FailReason};
use crate::typed::TaskContext;

/// Result of one fetch-dispatch-ack cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,
    Acked {
        task_id: TaskId,
        outcome: Outcome,
    },
    Failed {
        task_id: TaskId,
        disposition: FailDisposition,
    },
    /// The handler finished but the lease had already been reclaimed.
    LeaseLost { task_id: TaskId },
}

/// A single consumer. `WorkerPool` runs several of these in a loop; tests can
/// drive one directly with `tick()`.
pub struct Worker {
    id: String,
    broker: Arc<dyn Broker>,
    runtime: Arc<Runtime>,
}

impl Worker {
    pub fn new(id: impl Into<String>, broker: Arc<dyn Broker>, runtime: Arc<Runtime>) -> Self {
        Self {
            id: id.into(),
            broker,
            runtime,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lease at most one task, run it and report the result.
    ///
    /// The handler gets the lease's visibility timeout as its time budget; past
    /// that the task is redelivered elsewhere anyway.
    pub async fn tick(&self) -> Result<TickOutcome, BrokerError> {
        let Some(lease) = self.broker.dequeue(&self.id).await? else {
            return Ok(TickOutcome::Idle);
        };

        let task_id = lease.task_id();
        let ctx = TaskContext {
            task_id,
            task_type: lease.task_type().clone(),
            attempt: lease.attempt(),
            worker_id: lease.worker_id().to_string(),
        };
        tracing::debug!(
            task_id = %task_id,
            task_type = %ctx.task_type,
            attempt = lease.attempt(),
            max_attempts = lease.max_attempts(),
            enqueued_at = %lease.envelope().enqueued_at(),
            visible_until = %lease.visible_until(),
            "task started"
        );

        let budget = lease.visibility_timeout();
        let run = AssertUnwindSafe(self.runtime.execute(lease.envelope(), &ctx)).catch_unwind();
        let result = match tokio::time::timeout(budget, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(TaskError::Panicked(panic_message(&*panic))),
            Err(_) => Err(TaskError::TimedOut(budget)),
        };

        match result {
            Ok(outcome) => {
                if !self.broker.ack(&lease).await? {
                    tracing::warn!(
                        task_id = %task_id,
                        lease_id = %lease.lease_id(),
                        "lease lost before ack; task was redelivered"
                    );
                    return Ok(TickOutcome::LeaseLost { task_id });
                }
                tracing::debug!(
                    task_id = %task_id,
                    task_type = %ctx.task_type,
                    outcome = ?outcome.kind,
                    "task handled"
                );
                Ok(TickOutcome::Acked { task_id, outcome })
            }
            Err(err) => {
                let reason = if err.is_retryable() {
                    FailReason::Retryable(err.to_string())
                } else {
                    FailReason::Permanent(err.to_string())
                };
                let disposition = self.broker.fail(&lease, reason).await?;

                if let FailDisposition::DeadLettered { attempt } = disposition {
                    let escalated = if err.is_retryable() {
                        TaskError::ExhaustedRetries {
                            attempts: attempt,
                            last_error: err.to_string(),
                        }
                    } else {
                        err
                    };
                    tracing::error!(
                        task_id = %task_id,
                        task_type = %ctx.task_type,
                        error = %escalated,
                        "task gave up; operator attention needed"
                    );
                }
                Ok(TickOutcome::Failed {
                    task_id,
                    disposition,
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Worker pool handle.
/// - `request_shutdown()` で新しい lease の取得を止める
/// - `shutdown_and_join()` で実行中の handler の完了を待つ
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn spawn(
        n: usize,
        broker: Arc<dyn Broker>,
        runtime: Arc<Runtime>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for index in 0..n {
            let worker = Worker::new(
                format!("worker-{index}"),
                Arc::clone(&broker),
                Arc::clone(&runtime),
            );
            let rx = shutdown_rx.clone();
            let span = tracing::info_span!("worker", worker_id = %worker.id());

            joins.push(tokio::spawn(
                worker_loop(worker, poll_interval, rx).instrument(span),
            ));
        }

        tracing::info!(workers = n, "worker pool started");
        Self { shutdown_tx, joins }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    /// Request shutdown for all workers. In-flight handlers run to completion.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker task aborted");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker: Worker,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match worker.tick().await {
            Ok(TickOutcome::Idle) => {
                // 新着通知・poll 間隔・shutdown のどれかで起きる
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = worker.broker.wait_for_work(poll_interval) => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "broker call failed; backing off");
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, OutcomeKind, TaskType};
    use crate::ports::{ManualClock, UlidGenerator};
    use crate::queue::{BrokerOptions, InMemoryBroker, TaskState, VisibilityPolicy};
    use crate::typed::{Handler, Task, TypedRegistry};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Serialize, Deserialize)]
    struct FlakyTask {
        fail_times: u32,
    }

    impl Task for FlakyTask {
        const TYPE: &'static str = "test.flaky.v1";
    }

    #[derive(Serialize, Deserialize)]
    struct PanicTask {}

    impl Task for PanicTask {
        const TYPE: &'static str = "test.panic.v1";
    }

    #[derive(Default)]
    struct FlakyHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler<FlakyTask> for Arc<FlakyHandler> {
        async fn handle(&self, task: FlakyTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < task.fail_times {
                return Err(TaskError::TransientStore("flaky".into()));
            }
            Ok(Outcome::completed())
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl Handler<PanicTask> for PanicHandler {
        async fn handle(&self, _task: PanicTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            panic!("handler exploded");
        }
    }

    #[derive(Serialize, Deserialize)]
    struct SlowTask {}

    impl Task for SlowTask {
        const TYPE: &'static str = "test.slow.v1";
    }

    struct SlowHandler;

    #[async_trait]
    impl Handler<SlowTask> for SlowHandler {
        async fn handle(&self, _task: SlowTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Outcome::completed())
        }
    }

    #[derive(Serialize, Deserialize)]
    struct StalledTask {}

    impl Task for StalledTask {
        const TYPE: &'static str = "test.stalled.v1";
    }

    /// Lets the lease run out mid-handler and has another worker take the
    /// task over before returning.
    struct StalledHandler {
        broker: Arc<InMemoryBroker>,
        clock: ManualClock,
    }

    #[async_trait]
    impl Handler<StalledTask> for StalledHandler {
        async fn handle(&self, _task: StalledTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            self.clock.advance(chrono::Duration::seconds(31));
            let taken = self
                .broker
                .dequeue("worker-1")
                .await
                .map_err(|e| TaskError::TransientStore(e.to_string()))?;
            assert!(taken.is_some());
            Ok(Outcome::completed())
        }
    }

    struct Setup {
        broker: Arc<InMemoryBroker>,
        clock: ManualClock,
        flaky: Arc<FlakyHandler>,
        worker: Worker,
    }

    fn setup(max_attempts: u32) -> Setup {
        setup_with(BrokerOptions {
            max_attempts,
            ..BrokerOptions::default()
        })
    }

    fn setup_with(options: BrokerOptions) -> Setup {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let broker = Arc::new(InMemoryBroker::new(
            options,
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
        ));
        let flaky = Arc::new(FlakyHandler::default());
        let mut registry = TypedRegistry::new();
        registry.register::<FlakyTask, _>(flaky.clone()).unwrap();
        registry.register::<PanicTask, _>(PanicHandler).unwrap();
        registry.register::<SlowTask, _>(SlowHandler).unwrap();
        registry
            .register::<StalledTask, _>(StalledHandler {
                broker: broker.clone(),
                clock: clock.clone(),
            })
            .unwrap();
        let runtime = Arc::new(Runtime::new(Arc::new(registry)));
        let worker = Worker::new("worker-0", broker.clone(), runtime);
        Setup {
            broker,
            clock,
            flaky,
            worker,
        }
    }

    fn flaky(fail_times: u32) -> NewTask {
        NewTask::new(
            TaskType::new(FlakyTask::TYPE),
            serde_json::json!({ "fail_times": fail_times }),
        )
    }

    #[tokio::test]
    async fn idle_when_nothing_is_due() {
        let s = setup(3);
        assert_eq!(s.worker.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn succeeds_on_last_attempt_without_dead_letter() {
        let s = setup(3);
        let id = s.broker.enqueue(flaky(2), Duration::ZERO).await.unwrap();

        for _ in 0..2 {
            let tick = s.worker.tick().await.unwrap();
            assert!(matches!(
                tick,
                TickOutcome::Failed {
                    disposition: FailDisposition::RetryScheduled { .. },
                    ..
                }
            ));
            s.clock.advance(chrono::Duration::minutes(1));
        }

        let tick = s.worker.tick().await.unwrap();
        assert!(matches!(tick, TickOutcome::Acked { task_id, .. } if task_id == id));
        assert!(s.broker.dead_letters().await.unwrap().is_empty());
        assert_eq!(s.flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_as_failure() {
        let s = setup(3);
        let id = s
            .broker
            .enqueue(
                NewTask::new(TaskType::new(PanicTask::TYPE), serde_json::json!({})),
                Duration::ZERO,
            )
            .await
            .unwrap();

        let tick = s.worker.tick().await.unwrap();

        assert!(matches!(
            tick,
            TickOutcome::Failed {
                disposition: FailDisposition::RetryScheduled { attempt: 1, .. },
                ..
            }
        ));
        let record = s.broker.get(id).await.unwrap().unwrap();
        assert!(
            record
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("handler exploded"))
        );
    }

    #[tokio::test]
    async fn handler_running_past_its_lease_is_cut_off() {
        let s = setup_with(BrokerOptions {
            visibility: VisibilityPolicy::new(Duration::from_secs(30))
                .with_timeout(TaskType::new(SlowTask::TYPE), Duration::from_millis(20)),
            ..BrokerOptions::default()
        });
        let id = s
            .broker
            .enqueue(
                NewTask::new(TaskType::new(SlowTask::TYPE), serde_json::json!({})),
                Duration::ZERO,
            )
            .await
            .unwrap();

        let tick = s.worker.tick().await.unwrap();

        assert!(matches!(
            tick,
            TickOutcome::Failed {
                disposition: FailDisposition::RetryScheduled { attempt: 1, .. },
                ..
            }
        ));
        let record = s.broker.get(id).await.unwrap().unwrap();
        assert!(
            record
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("did not finish"))
        );
    }

    #[tokio::test]
    async fn ack_after_losing_the_lease_leaves_the_new_holder_alone() {
        let s = setup(5);
        let id = s
            .broker
            .enqueue(
                NewTask::new(TaskType::new(StalledTask::TYPE), serde_json::json!({})),
                Duration::ZERO,
            )
            .await
            .unwrap();

        let tick = s.worker.tick().await.unwrap();

        assert_eq!(tick, TickOutcome::LeaseLost { task_id: id });
        let record = s.broker.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::InFlight);
        assert_eq!(
            record.lease.map(|lease| lease.worker_id).as_deref(),
            Some("worker-1")
        );
        assert_eq!(s.broker.counts().await.unwrap().acked, 0);
    }

    #[tokio::test]
    async fn unknown_kind_is_dead_lettered_immediately() {
        let s = setup(5);
        s.broker
            .enqueue(
                NewTask::new(TaskType::new("test.unknown.v1"), serde_json::json!({})),
                Duration::ZERO,
            )
            .await
            .unwrap();

        let tick = s.worker.tick().await.unwrap();

        assert!(matches!(
            tick,
            TickOutcome::Failed {
                disposition: FailDisposition::DeadLettered { attempt: 1 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pool_drains_due_work_and_shuts_down() {
        let s = setup(3);
        for _ in 0..5 {
            s.broker.enqueue(flaky(0), Duration::ZERO).await.unwrap();
        }
        let runtime = s.worker.runtime.clone();

        let pool = WorkerPool::spawn(3, s.broker.clone(), runtime, Duration::from_millis(10));
        assert_eq!(pool.size(), 3);

        for _ in 0..200 {
            if s.broker.counts().await.unwrap().acked == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        pool.shutdown_and_join().await;

        let counts = s.broker.counts().await.unwrap();
        assert_eq!(counts.acked, 5);
        assert_eq!(counts.outstanding(), 0);
    }

    #[test]
    fn outcome_kind_is_preserved_in_tick() {
        let tick = TickOutcome::Acked {
            task_id: TaskId::from_ulid(ulid::Ulid::new()),
            outcome: Outcome::skipped("dup"),
        };
        assert!(matches!(
            tick,
            TickOutcome::Acked { outcome, .. } if outcome.kind == OutcomeKind::Skipped
        ));
    }
}
