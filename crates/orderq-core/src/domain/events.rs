//! Order state-change events carried by the event relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::EventId;
use super::order::{HomestayOrder, OrderSn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    OrderClosed,
    OrderPaid,
}

impl fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderEventKind::OrderClosed => f.write_str("order_closed"),
            OrderEventKind::OrderPaid => f.write_str("order_paid"),
        }
    }
}

/// An event published for other services (inventory, user-center, ...).
///
/// Partitioned by `sn` so per-order events stay in publish order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: EventId,
    pub kind: OrderEventKind,
    pub sn: OrderSn,
    pub order: HomestayOrder,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(
        event_id: EventId,
        kind: OrderEventKind,
        order: HomestayOrder,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            kind,
            sn: order.sn.clone(),
            order,
            occurred_at,
        }
    }

    /// Key consumers dedupe on: one logical event per order and kind.
    pub fn idempotency_key(&self) -> (OrderSn, OrderEventKind) {
        (self.sn.clone(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_wire_name() {
        assert_eq!(
            serde_json::to_string(&OrderEventKind::OrderClosed).unwrap(),
            "\"order_closed\""
        );
        assert_eq!(OrderEventKind::OrderPaid.to_string(), "order_paid");
    }
}
