//! Scheduler - producer 側
//!
//! 業務イベント（注文作成・支払い成功）から deferred task を enqueue します。
//! 重複 enqueue は許容（handler 側が冪等）。重複排除はしません。

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{HomestayOrder, OrderSn, TaskId};
use crate::payloads::{DeferCloseHomestayOrderPayload, PaySuccessNotifyUserPayload};
use crate::queue::{Broker, BrokerError};
use crate::typed::{CodecError, PayloadCodec, Task};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Producer handle. Cheap to clone; every clone shares the same broker.
#[derive(Clone)]
pub struct Scheduler {
    broker: Arc<dyn Broker>,
    hold_window: Duration,
}

impl Scheduler {
    pub fn new(broker: Arc<dyn Broker>, hold_window: Duration) -> Self {
        Self {
            broker,
            hold_window,
        }
    }

    /// Default hold window for new orders.
    pub fn hold_window(&self) -> Duration {
        self.hold_window
    }

    async fn enqueue<T: Task>(&self, task: &T, delay: Duration) -> Result<TaskId, ScheduleError> {
        let new_task = PayloadCodec::encode(task)?;
        Ok(self.broker.enqueue(new_task, delay).await?)
    }

    /// Called once at order creation: close the order if it is still unpaid
    /// after `hold_window`.
    pub async fn schedule_deferred_close(
        &self,
        sn: &OrderSn,
        hold_window: Duration,
    ) -> Result<TaskId, ScheduleError> {
        let payload = DeferCloseHomestayOrderPayload { sn: sn.clone() };
        let task_id = self.enqueue(&payload, hold_window).await?;
        tracing::info!(
            task_id = %task_id,
            sn = %sn,
            hold_window_secs = hold_window.as_secs(),
            "deferred close scheduled"
        );
        Ok(task_id)
    }

    /// Called once per payment-success event: notify the user right away.
    pub async fn schedule_success_notify(
        &self,
        order: &HomestayOrder,
    ) -> Result<TaskId, ScheduleError> {
        let payload = PaySuccessNotifyUserPayload {
            order: order.clone(),
        };
        let task_id = self.enqueue(&payload, Duration::ZERO).await?;
        tracing::info!(task_id = %task_id, sn = %order.sn, "payment notification scheduled");
        Ok(task_id)
    }

    /// Payment landed: schedule the notification, then try to cancel the
    /// pending close. Losing the cancel race is fine; the close handler
    /// re-checks the order and skips it.
    pub async fn on_payment_succeeded(
        &self,
        order: &HomestayOrder,
        pending_close: Option<TaskId>,
    ) -> Result<TaskId, ScheduleError> {
        let notify_id = self.schedule_success_notify(order).await?;

        if let Some(close_id) = pending_close {
            match self.broker.cancel(close_id).await {
                Ok(true) => {
                    tracing::info!(task_id = %close_id, sn = %order.sn, "pending close cancelled");
                }
                Ok(false) => {
                    tracing::debug!(
                        task_id = %close_id,
                        sn = %order.sn,
                        "pending close already running or done; left to the close handler"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        task_id = %close_id,
                        sn = %order.sn,
                        error = %err,
                        "cancel of pending close failed"
                    );
                }
            }
        }

        Ok(notify_id)
    }
}
