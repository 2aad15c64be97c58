use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    HomestayOrder, OrderEvent, OrderEventKind, OrderSn, OrderStatus, Outcome, TaskError,
};
use crate::payloads::DeferCloseHomestayOrderPayload;
use crate::ports::{Clock, EventPublisher, IdGenerator, Inventory, OrderStore, StoreError};
use crate::typed::{Handler, TaskContext};

/// Read, then compare-and-swap; on a lost guard re-read once more.
const CAS_ROUNDS: usize = 2;

/// Closes an order whose hold window ran out without payment.
///
/// Payment always wins: the live status is re-read on every delivery and the
/// close is a conditional `created -> closed` guarded by the order version.
pub struct OrderCloseHandler {
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn Inventory>,
    publisher: Arc<dyn EventPublisher>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl OrderCloseHandler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn Inventory>,
        publisher: Arc<dyn EventPublisher>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            inventory,
            publisher,
            ids,
            clock,
        }
    }

    /// Side effects of a committed close. Neither may undo or retry the close.
    async fn after_close(&self, mut order: HomestayOrder, ctx: &TaskContext) {
        let now = self.clock.now();
        order.status = OrderStatus::Closed;
        order.version += 1;
        order.updated_at = now;

        if let Err(err) = self.inventory.release_hold(&order.sn).await {
            tracing::error!(
                task_id = %ctx.task_id,
                sn = %order.sn,
                error = %err,
                "inventory release failed after close; left for reconciliation"
            );
        }

        let sn = order.sn.clone();
        let event = OrderEvent::new(
            self.ids.generate_event_id(),
            OrderEventKind::OrderClosed,
            order,
            now,
        );
        let event_id = event.event_id;
        if let Err(err) = self.publisher.publish(event).await {
            tracing::error!(
                task_id = %ctx.task_id,
                sn = %sn,
                event_id = %event_id,
                error = %err,
                "order_closed publish failed"
            );
        }
    }

    fn skip(sn: &OrderSn, ctx: &TaskContext, reason: String) -> Outcome {
        tracing::info!(task_id = %ctx.task_id, sn = %sn, reason = %reason, "close skipped");
        Outcome::skipped(reason)
    }
}

#[async_trait]
impl Handler<DeferCloseHomestayOrderPayload> for OrderCloseHandler {
    async fn handle(
        &self,
        task: DeferCloseHomestayOrderPayload,
        ctx: &TaskContext,
    ) -> Result<Outcome, TaskError> {
        let sn = task.sn;

        for round in 0..CAS_ROUNDS {
            let order = match self.store.get_order(&sn).await {
                Ok(order) => order,
                Err(StoreError::NotFound(_)) => {
                    return Ok(Self::skip(&sn, ctx, "order not found".to_string()));
                }
                Err(err) => return Err(err.into()),
            };

            if order.status != OrderStatus::Created {
                return Ok(Self::skip(&sn, ctx, format!("order is {}", order.status)));
            }

            let closed = self
                .store
                .compare_and_swap_status(
                    &sn,
                    OrderStatus::Created,
                    OrderStatus::Closed,
                    order.version,
                )
                .await?;
            if closed {
                tracing::info!(task_id = %ctx.task_id, sn = %sn, "order closed");
                self.after_close(order, ctx).await;
                return Ok(Outcome::completed());
            }

            tracing::debug!(
                task_id = %ctx.task_id,
                sn = %sn,
                round,
                "status guard lost; re-reading order"
            );
        }

        Err(TaskError::ConcurrentModification { sn: sn.to_string() })
    }
}
