use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{HomestayOrder, OrderEvent, OrderEventKind, Outcome, TaskError};
use crate::payloads::PaySuccessNotifyUserPayload;
use crate::ports::{
    Clock, EventPublisher, IdGenerator, NotificationLedger, NotificationRecord, Notifier,
};
use crate::typed::{Handler, TaskContext};

/// User-facing text for a successful payment.
pub fn render_payment_message(order: &HomestayOrder) -> String {
    let cents = order.order_total_price;
    let sign = if cents < 0 { "-" } else { "" };
    format!(
        "Payment received for \"{}\" (order {}), stay {} to {}, total {}{}.{:02}",
        order.title,
        order.sn,
        order.live_start_date,
        order.live_end_date,
        sign,
        cents.unsigned_abs() / 100,
        cents.unsigned_abs() % 100,
    )
}

/// Notifies the user once per paid order.
///
/// Steps: ledger check, `order_paid` event, user message, ledger write. The
/// record is written only after the side effects succeeded, so a failure in
/// between leads to a retry rather than a lost notification.
pub struct PaySuccessNotifyHandler {
    ledger: Arc<dyn NotificationLedger>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn EventPublisher>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl PaySuccessNotifyHandler {
    pub fn new(
        ledger: Arc<dyn NotificationLedger>,
        notifier: Arc<dyn Notifier>,
        publisher: Arc<dyn EventPublisher>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            notifier,
            publisher,
            ids,
            clock,
        }
    }
}

#[async_trait]
impl Handler<PaySuccessNotifyUserPayload> for PaySuccessNotifyHandler {
    async fn handle(
        &self,
        task: PaySuccessNotifyUserPayload,
        ctx: &TaskContext,
    ) -> Result<Outcome, TaskError> {
        let order = task.order;
        let sn = order.sn.clone();

        if let Some(record) = self.ledger.get(&sn).await? {
            tracing::info!(
                task_id = %ctx.task_id,
                sn = %sn,
                notified_by = %record.task_id,
                "payment notification already delivered"
            );
            return Ok(Outcome::skipped("already notified"));
        }

        let user_id = order.user_id;
        let message = render_payment_message(&order);

        let event = OrderEvent::new(
            self.ids.generate_event_id(),
            OrderEventKind::OrderPaid,
            order,
            self.clock.now(),
        );
        self.publisher.publish(event).await?;

        self.notifier.send(user_id, &message).await?;

        let record = NotificationRecord {
            sn: sn.clone(),
            user_id,
            task_id: ctx.task_id,
            delivered_at: self.clock.now(),
        };
        if !self.ledger.put(record).await? {
            tracing::warn!(
                task_id = %ctx.task_id,
                sn = %sn,
                "notification record already present; another delivery raced this one"
            );
        }

        tracing::info!(task_id = %ctx.task_id, sn = %sn, user_id, "payment notification delivered");
        Ok(Outcome::completed())
    }
}
