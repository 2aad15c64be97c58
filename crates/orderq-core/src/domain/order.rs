//! Order view used by the coordinator.
//!
//! The order store owns these rows. Handlers only read snapshots and issue
//! conditional status changes against them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Business key of an order. Also the idempotency key for close/notify.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSn(String);

impl OrderSn {
    pub fn new(sn: impl Into<String>) -> Self {
        Self(sn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderSn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OrderSn {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Order trade state.
///
/// State transitions relevant here:
/// - Created -> Paid
/// - Created -> Closed
/// - Paid -> Refunded | Used
///
/// `Paid -> Closed` and `Closed -> Paid` are never allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for payment. The only state a deferred close acts on.
    Created,
    Paid,
    Closed,
    Refunded,
    Used,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Paid) | (Created, Closed) | (Paid, Refunded) | (Paid, Used)
        )
    }

    pub fn is_awaiting_payment(self) -> bool {
        self == OrderStatus::Created
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Closed => "closed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Used => "used",
        };
        f.write_str(s)
    }
}

/// Snapshot of a homestay order.
///
/// `version` is bumped by the store on every mutation and is the optimistic
/// concurrency guard for `compare_and_swap_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomestayOrder {
    pub sn: OrderSn,
    pub user_id: i64,
    pub homestay_id: i64,
    pub title: String,
    pub live_start_date: NaiveDate,
    pub live_end_date: NaiveDate,
    /// Total price in cents.
    pub order_total_price: i64,
    pub status: OrderStatus,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}
