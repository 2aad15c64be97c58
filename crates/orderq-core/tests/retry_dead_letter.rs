mod common;

use chrono::Duration;
use common::Harness;
use orderq_core::app::TickOutcome;
use orderq_core::domain::{OrderSn, OrderStatus};
use orderq_core::ports::OrderStore;
use orderq_core::queue::{Broker, FailDisposition};

fn failures(ticks: &[TickOutcome]) -> usize {
    ticks
        .iter()
        .filter(|t| matches!(t, TickOutcome::Failed { .. }))
        .count()
}

/// Tick, then jump past the largest backoff, `rounds` times.
async fn run_with_backoff(h: &Harness, rounds: usize) -> Vec<TickOutcome> {
    let mut ticks = Vec::new();
    for _ in 0..rounds {
        ticks.extend(h.run_due().await);
        h.advance(Duration::minutes(2));
    }
    ticks
}

#[tokio::test]
async fn success_on_the_last_attempt_is_acked_not_dead_lettered() {
    let h = Harness::with_max_attempts(5);
    let order = h.create_order("SN1").await;
    h.scheduler
        .schedule_deferred_close(&order.sn, std::time::Duration::ZERO)
        .await
        .unwrap();
    h.store.fail_next_reads(4);

    let ticks = run_with_backoff(&h, 6).await;

    assert_eq!(failures(&ticks), 4);
    assert!(matches!(ticks.last(), Some(TickOutcome::Acked { .. })));
    assert!(h.broker.dead_letters().await.unwrap().is_empty());
    assert_eq!(
        h.store.get_order(&order.sn).await.unwrap().status,
        OrderStatus::Closed
    );
}

#[tokio::test]
async fn exhausting_attempts_dead_letters_exactly_once() {
    let h = Harness::with_max_attempts(5);
    let order = h.create_order("SN2").await;
    let id = h
        .scheduler
        .schedule_deferred_close(&order.sn, std::time::Duration::ZERO)
        .await
        .unwrap();
    h.store.fail_next_reads(100);

    let ticks = run_with_backoff(&h, 10).await;

    assert_eq!(failures(&ticks), 5);
    let dead_lettered = ticks
        .iter()
        .filter(|t| {
            matches!(
                t,
                TickOutcome::Failed {
                    disposition: FailDisposition::DeadLettered { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(dead_lettered, 1);

    let dead = h.broker.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].task_id, id);
    assert_eq!(dead[0].attempts, 5);
    assert!(dead[0].last_error.contains("store"));
    assert_eq!(h.broker.counts().await.unwrap().dead_lettered, 1);

    // The order stays open for an operator to resolve.
    h.store.fail_next_reads(0);
    assert_eq!(
        h.store.get_order(&OrderSn::new("SN2")).await.unwrap().status,
        OrderStatus::Created
    );
}

#[tokio::test]
async fn backoff_grows_between_attempts() {
    let h = Harness::with_max_attempts(5);
    let order = h.create_order("SN3").await;
    h.scheduler
        .schedule_deferred_close(&order.sn, std::time::Duration::ZERO)
        .await
        .unwrap();
    h.store.fail_next_reads(3);

    // Failure 1 -> retry after 1s.
    assert_eq!(failures(&h.run_due().await), 1);
    h.advance(Duration::milliseconds(999));
    assert!(h.run_due().await.is_empty());
    h.advance(Duration::milliseconds(1));

    // Failure 2 -> retry after 2s.
    assert_eq!(failures(&h.run_due().await), 1);
    h.advance(Duration::seconds(1));
    assert!(h.run_due().await.is_empty());
    h.advance(Duration::seconds(1));

    // Failure 3 -> retry after 4s, then success.
    assert_eq!(failures(&h.run_due().await), 1);
    h.advance(Duration::seconds(3));
    assert!(h.run_due().await.is_empty());
    h.advance(Duration::seconds(1));
    assert!(matches!(
        h.run_due().await.as_slice(),
        [TickOutcome::Acked { .. }]
    ));
}

#[tokio::test]
async fn failed_notification_is_retried_until_delivered_once() {
    let h = Harness::new();
    let order = h.create_order("SN4").await;
    let paid = h.store.mark_paid(&order.sn).await.unwrap().unwrap();
    h.scheduler.schedule_success_notify(&paid).await.unwrap();
    h.notifier.fail_next_sends(2);

    let ticks = run_with_backoff(&h, 4).await;

    assert_eq!(failures(&ticks), 2);
    assert_eq!(h.notifier.sent().await.len(), 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered_without_retry() {
    let h = Harness::new();
    h.broker
        .enqueue(
            orderq_core::domain::NewTask::new(
                "order.defer_close_homestay_order.v1".into(),
                serde_json::json!({ "serial": 42 }),
            ),
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();

    let ticks = h.run_due().await;

    assert!(matches!(
        ticks.as_slice(),
        [TickOutcome::Failed {
            disposition: FailDisposition::DeadLettered { attempt: 1 },
            ..
        }]
    ));
    assert_eq!(h.broker.dead_letters().await.unwrap().len(), 1);
}
