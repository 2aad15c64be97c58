#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use orderq_core::app::{AppBuilder, Runtime, Scheduler, TickOutcome, Worker};
use orderq_core::domain::{HomestayOrder, OrderSn, OrderStatus};
use orderq_core::handlers::{OrderCloseHandler, PaySuccessNotifyHandler};
use orderq_core::impls::{
    InMemoryEventRelay, InMemoryNotificationLedger, InMemoryOrderStore, LoggingInventory,
    LoggingNotifier,
};
use orderq_core::payloads::{DeferCloseHomestayOrderPayload, PaySuccessNotifyUserPayload};
use orderq_core::ports::{Clock, IdGenerator, ManualClock, UlidGenerator};
use orderq_core::queue::{Broker, BrokerOptions, InMemoryBroker, RetryPolicy};
use orderq_core::typed::Task;

pub const HOLD_WINDOW: Duration = Duration::from_secs(30 * 60);

/// The full in-memory stack on a manual clock, with one worker driven by hand.
pub struct Harness {
    pub clock: ManualClock,
    pub broker: Arc<InMemoryBroker>,
    pub store: Arc<InMemoryOrderStore>,
    pub ledger: Arc<InMemoryNotificationLedger>,
    pub relay: Arc<InMemoryEventRelay>,
    pub inventory: Arc<LoggingInventory>,
    pub notifier: Arc<LoggingNotifier>,
    pub scheduler: Scheduler,
    pub runtime: Arc<Runtime>,
    pub worker: Worker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_max_attempts(5)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));

        let broker = Arc::new(InMemoryBroker::new(
            BrokerOptions {
                max_attempts,
                retry: RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60)),
                ..BrokerOptions::default()
            },
            shared_clock.clone(),
            ids.clone(),
        ));
        let store = Arc::new(InMemoryOrderStore::new(shared_clock.clone()));
        let ledger = Arc::new(InMemoryNotificationLedger::new());
        let relay = Arc::new(InMemoryEventRelay::new(4));
        let inventory = Arc::new(LoggingInventory::new());
        let notifier = Arc::new(LoggingNotifier::new());

        let app = AppBuilder::new()
            .register::<DeferCloseHomestayOrderPayload, _>(OrderCloseHandler::new(
                store.clone(),
                inventory.clone(),
                relay.clone(),
                ids.clone(),
                shared_clock.clone(),
            ))
            .unwrap()
            .register::<PaySuccessNotifyUserPayload, _>(PaySuccessNotifyHandler::new(
                ledger.clone(),
                notifier.clone(),
                relay.clone(),
                ids.clone(),
                shared_clock.clone(),
            ))
            .unwrap()
            .expect_tasks(&[
                DeferCloseHomestayOrderPayload::TYPE,
                PaySuccessNotifyUserPayload::TYPE,
            ])
            .build()
            .unwrap();

        let scheduler = Scheduler::new(broker.clone(), HOLD_WINDOW);
        let runtime = app.runtime();
        let worker = Worker::new("test-worker", broker.clone(), runtime.clone());

        Self {
            clock,
            broker,
            store,
            ledger,
            relay,
            inventory,
            notifier,
            scheduler,
            runtime,
            worker,
        }
    }

    /// Tick the worker until nothing is due.
    pub async fn run_due(&self) -> Vec<TickOutcome> {
        let mut ticks = Vec::new();
        loop {
            match self.worker.tick().await.unwrap() {
                TickOutcome::Idle => return ticks,
                tick => ticks.push(tick),
            }
        }
    }

    pub async fn broker_is_drained(&self) -> bool {
        self.broker.counts().await.unwrap().outstanding() == 0
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    pub async fn create_order(&self, sn: &str) -> HomestayOrder {
        let order = order(sn, 1000 + sn.len() as i64);
        self.store.insert(order.clone()).await;
        order
    }
}

pub fn order(sn: &str, user_id: i64) -> HomestayOrder {
    HomestayOrder {
        sn: OrderSn::new(sn),
        user_id,
        homestay_id: 11,
        title: "Mountain lodge".to_string(),
        live_start_date: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
        live_end_date: NaiveDate::from_ymd_opt(2024, 4, 12).unwrap(),
        order_total_price: 32_000,
        status: OrderStatus::Created,
        version: 1,
        updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}
