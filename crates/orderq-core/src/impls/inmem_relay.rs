//! InMemoryEventRelay - 開発用の pub/sub
//!
//! # 実装詳細
//! - パーティション数は固定、パーティションは sn の安定ハッシュで決まる
//!   （同じ注文のイベントは publish 順に並ぶ）
//! - consumer group ごと・パーティションごとに commit 済み offset を持つ
//! - `poll` は未 commit のイベントを返す。commit するまで何度でも返る
//!   （at-least-once）

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::fault::FaultInjector;
use crate::domain::{OrderEvent, OrderEventKind, OrderSn};
use crate::ports::{EventPublisher, RelayError};

/// An event handed to a consumer group, with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub partition: usize,
    pub offset: usize,
    pub event: OrderEvent,
}

struct RelayState {
    partitions: Vec<Vec<OrderEvent>>,
    /// (group, partition) -> next offset to deliver
    committed: HashMap<(String, usize), usize>,
    closed: bool,
}

pub struct InMemoryEventRelay {
    state: Mutex<RelayState>,
    publish_faults: FaultInjector,
}

impl InMemoryEventRelay {
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        Self {
            state: Mutex::new(RelayState {
                partitions: vec![Vec::new(); partitions],
                committed: HashMap::new(),
                closed: false,
            }),
            publish_faults: FaultInjector::new(),
        }
    }

    pub async fn partition_count(&self) -> usize {
        self.state.lock().await.partitions.len()
    }

    /// Up to `max` uncommitted events for `group`, partition by partition.
    pub async fn poll(&self, group: &str, max: usize) -> Vec<Delivery> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for (partition, events) in state.partitions.iter().enumerate() {
            let start = state
                .committed
                .get(&(group.to_string(), partition))
                .copied()
                .unwrap_or(0);
            for (offset, event) in events.iter().enumerate().skip(start) {
                if out.len() >= max {
                    return out;
                }
                out.push(Delivery {
                    partition,
                    offset,
                    event: event.clone(),
                });
            }
        }
        out
    }

    /// Mark `delivery` (and everything before it in its partition) as
    /// processed by `group`.
    pub async fn commit(&self, group: &str, delivery: &Delivery) {
        let mut state = self.state.lock().await;
        let next = state
            .committed
            .entry((group.to_string(), delivery.partition))
            .or_insert(0);
        *next = (*next).max(delivery.offset + 1);
    }

    /// Every event ever published, in partition order.
    pub async fn published(&self) -> Vec<OrderEvent> {
        let state = self.state.lock().await;
        state.partitions.iter().flatten().cloned().collect()
    }

    /// Reject further publishes.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Make the next `n` publishes fail as unavailable.
    pub fn fail_next_publishes(&self, n: u32) {
        self.publish_faults.arm(n);
    }

    fn partition_for(sn: &OrderSn, partitions: usize) -> usize {
        // FNV-1a: stable across processes, unlike the std hasher.
        let hash = sn
            .as_str()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        (hash % partitions as u64) as usize
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventRelay {
    async fn publish(&self, event: OrderEvent) -> Result<(), RelayError> {
        if self.publish_faults.trip() {
            return Err(RelayError::Unavailable(format!(
                "publish of {} for {} timed out",
                event.kind, event.sn
            )));
        }
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(RelayError::Closed);
        }
        let partition = Self::partition_for(&event.sn, state.partitions.len());
        tracing::debug!(
            event_id = %event.event_id,
            kind = %event.kind,
            sn = %event.sn,
            partition,
            "event published"
        );
        state.partitions[partition].push(event);
        Ok(())
    }
}

/// Consumer-side dedupe: one logical event per `(sn, kind)`.
#[derive(Debug, Default)]
pub struct IdempotencyFilter {
    seen: HashSet<(OrderSn, OrderEventKind)>,
}

impl IdempotencyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time this event's key is seen.
    pub fn first_time(&mut self, event: &OrderEvent) -> bool {
        self.seen.insert(event.idempotency_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventId, HomestayOrder, OrderStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use ulid::Ulid;

    fn event(sn: &str, kind: OrderEventKind) -> OrderEvent {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let order = HomestayOrder {
            sn: OrderSn::new(sn),
            user_id: 1,
            homestay_id: 1,
            title: "room".to_string(),
            live_start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            live_end_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            order_total_price: 10_000,
            status: OrderStatus::Closed,
            version: 2,
            updated_at: now,
        };
        OrderEvent::new(EventId::from_ulid(Ulid::new()), kind, order, now)
    }

    #[tokio::test]
    async fn uncommitted_events_are_redelivered() {
        let relay = InMemoryEventRelay::new(4);
        relay
            .publish(event("SN1", OrderEventKind::OrderClosed))
            .await
            .unwrap();

        let first = relay.poll("inventory", 10).await;
        assert_eq!(first.len(), 1);
        assert_eq!(relay.poll("inventory", 10).await, first);

        relay.commit("inventory", &first[0]).await;
        assert!(relay.poll("inventory", 10).await.is_empty());
    }

    #[tokio::test]
    async fn groups_track_offsets_independently() {
        let relay = InMemoryEventRelay::new(4);
        relay
            .publish(event("SN1", OrderEventKind::OrderPaid))
            .await
            .unwrap();

        let inventory = relay.poll("inventory", 10).await;
        relay.commit("inventory", &inventory[0]).await;

        assert!(relay.poll("inventory", 10).await.is_empty());
        assert_eq!(relay.poll("user-center", 10).await.len(), 1);
    }

    #[tokio::test]
    async fn events_for_one_order_stay_in_publish_order() {
        let relay = InMemoryEventRelay::new(8);
        relay
            .publish(event("SN7", OrderEventKind::OrderPaid))
            .await
            .unwrap();
        relay
            .publish(event("SN7", OrderEventKind::OrderClosed))
            .await
            .unwrap();

        let deliveries = relay.poll("g", 10).await;
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].partition, deliveries[1].partition);
        assert_eq!(deliveries[0].event.kind, OrderEventKind::OrderPaid);
        assert_eq!(deliveries[1].event.kind, OrderEventKind::OrderClosed);
    }

    #[tokio::test]
    async fn zero_partitions_falls_back_to_one() {
        let relay = InMemoryEventRelay::new(0);
        assert_eq!(relay.partition_count().await, 1);

        relay
            .publish(event("SN1", OrderEventKind::OrderPaid))
            .await
            .unwrap();
        assert_eq!(relay.poll("g", 10).await[0].partition, 0);
    }

    #[tokio::test]
    async fn closed_relay_rejects_publish() {
        let relay = InMemoryEventRelay::new(1);
        relay.close().await;

        let err = relay
            .publish(event("SN1", OrderEventKind::OrderPaid))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Closed));
    }

    #[test]
    fn filter_drops_repeats_of_the_same_key() {
        let mut filter = IdempotencyFilter::new();
        let paid = event("SN1", OrderEventKind::OrderPaid);

        assert!(filter.first_time(&paid));
        assert!(!filter.first_time(&event("SN1", OrderEventKind::OrderPaid)));
        assert!(filter.first_time(&event("SN1", OrderEventKind::OrderClosed)));
    }
}
