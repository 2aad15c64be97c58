use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use orderq_core::app::{AppBuilder, Scheduler};
use orderq_core::config::Settings;
use orderq_core::domain::{HomestayOrder, OrderSn, OrderStatus};
use orderq_core::handlers::{OrderCloseHandler, PaySuccessNotifyHandler};
use orderq_core::impls::{
    IdempotencyFilter, InMemoryEventRelay, InMemoryNotificationLedger, InMemoryOrderStore,
    LoggingInventory, LoggingNotifier,
};
use orderq_core::observability::init_tracing;
use orderq_core::payloads::{DeferCloseHomestayOrderPayload, PaySuccessNotifyUserPayload};
use orderq_core::ports::{Clock, IdGenerator, OrderStore, SystemClock, UlidGenerator};
use orderq_core::queue::{Broker, InMemoryBroker};
use orderq_core::typed::Task;

/// The abandoned demo order is closed after this instead of the full hold window.
const DEMO_HOLD_WINDOW: Duration = Duration::from_secs(2);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn demo_order(sn: &str, user_id: i64, title: &str, price_cents: i64) -> anyhow::Result<HomestayOrder> {
    let start = NaiveDate::from_ymd_opt(2025, 7, 1).context("invalid demo date")?;
    let end = NaiveDate::from_ymd_opt(2025, 7, 3).context("invalid demo date")?;
    Ok(HomestayOrder {
        sn: OrderSn::new(sn),
        user_id,
        homestay_id: 1,
        title: title.to_string(),
        live_start_date: start,
        live_end_date: end,
        order_total_price: price_cents,
        status: OrderStatus::Created,
        version: 1,
        updated_at: Utc::now(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.observability).context("initialising tracing")?;

    // (A) collaborators: explicitly constructed, shared by handle
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
    let broker = Arc::new(InMemoryBroker::new(
        settings.queue.broker_options(),
        clock.clone(),
        ids.clone(),
    ));
    let store = Arc::new(InMemoryOrderStore::new(clock.clone()));
    let ledger = Arc::new(InMemoryNotificationLedger::new());
    let relay = Arc::new(InMemoryEventRelay::new(settings.relay.partitions));
    let inventory = Arc::new(LoggingInventory::new());
    let notifier = Arc::new(LoggingNotifier::new());

    // (B) handlers, fail fast if a kind is left unhandled
    let app = AppBuilder::new()
        .register::<DeferCloseHomestayOrderPayload, _>(OrderCloseHandler::new(
            store.clone(),
            inventory.clone(),
            relay.clone(),
            ids.clone(),
            clock.clone(),
        ))?
        .register::<PaySuccessNotifyUserPayload, _>(PaySuccessNotifyHandler::new(
            ledger.clone(),
            notifier.clone(),
            relay.clone(),
            ids.clone(),
            clock.clone(),
        ))?
        .expect_tasks(&[
            DeferCloseHomestayOrderPayload::TYPE,
            PaySuccessNotifyUserPayload::TYPE,
        ])
        .build()?;

    // (C) workers
    let pool = app.spawn_workers(
        settings.worker.concurrency,
        broker.clone(),
        settings.worker.poll_interval(),
    );
    let scheduler = Scheduler::new(broker.clone(), settings.order.hold_window());

    // (D) an order nobody pays for, and one that gets paid
    let abandoned = demo_order("SN100", 1001, "Hillside cabin", 38_800)?;
    let paid = demo_order("SN200", 1002, "Harbour view suite", 59_900)?;
    store.insert(abandoned.clone()).await;
    store.insert(paid.clone()).await;

    scheduler
        .schedule_deferred_close(&abandoned.sn, DEMO_HOLD_WINDOW)
        .await?;
    let pending_close = scheduler
        .schedule_deferred_close(&paid.sn, scheduler.hold_window())
        .await?;

    match store.mark_paid(&paid.sn).await? {
        Some(paid_order) => {
            scheduler
                .on_payment_succeeded(&paid_order, Some(pending_close))
                .await?;
        }
        None => tracing::warn!(sn = %paid.sn, "order was no longer awaiting payment"),
    }

    // (E) wait for the queue to drain (or Ctrl-C)
    let drained = tokio::select! {
        drained = wait_until_drained(broker.as_ref(), DRAIN_TIMEOUT) => drained?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            false
        }
    };
    if !drained {
        tracing::warn!("queue did not drain before shutdown");
    }
    pool.shutdown_and_join().await;

    // (F) report
    let counts = broker.counts().await?;
    println!(
        "queue: pending={} in_flight={} retry_scheduled={} acked={} dead_lettered={} cancelled={}",
        counts.pending,
        counts.in_flight,
        counts.retry_scheduled,
        counts.acked,
        counts.dead_lettered,
        counts.cancelled
    );
    for sn in [&abandoned.sn, &paid.sn] {
        let order = store.get_order(sn).await?;
        println!("order {}: {}", order.sn, order.status);
    }
    println!("notifications sent: {}", notifier.sent().await.len());

    // An inventory-side consumer, deduping by (sn, kind).
    println!("relay partitions: {}", relay.partition_count().await);
    let mut filter = IdempotencyFilter::new();
    for delivery in relay.poll("inventory", 100).await {
        if filter.first_time(&delivery.event) {
            println!(
                "event {} {} (partition {})",
                delivery.event.kind, delivery.event.sn, delivery.partition
            );
        }
        relay.commit("inventory", &delivery).await;
    }

    Ok(())
}

async fn wait_until_drained(broker: &dyn Broker, timeout: Duration) -> anyhow::Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if broker.counts().await?.outstanding() == 0 {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
