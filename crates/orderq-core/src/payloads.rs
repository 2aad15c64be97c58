//! Task payload kinds carried by the broker.
//!
//! These types are the wire contract between the scheduler and the workers.
//! A new kind is a new struct implementing `Task` plus a handler registered
//! for it; existing kinds are untouched.

use serde::{Deserialize, Serialize};

use crate::domain::{HomestayOrder, OrderSn};
use crate::typed::Task;

/// Close an order that is still unpaid when its hold window ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferCloseHomestayOrderPayload {
    pub sn: OrderSn,
}

impl Task for DeferCloseHomestayOrderPayload {
    const TYPE: &'static str = "order.defer_close_homestay_order.v1";
}

/// Tell the user their payment went through. Carries the order snapshot taken
/// at payment time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaySuccessNotifyUserPayload {
    pub order: HomestayOrder,
}

impl Task for PaySuccessNotifyUserPayload {
    const TYPE: &'static str = "order.pay_success_notify_user.v1";
}
