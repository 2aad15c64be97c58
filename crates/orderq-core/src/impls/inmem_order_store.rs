//! InMemoryOrderStore - 開発用の注文ストア
//!
//! `compare_and_swap_status` は version guard（楽観ロック）と
//! `OrderStatus::can_transition_to` の両方を満たしたときだけ書き込みます。
//! 成功した遷移はすべて履歴に残るので、テストで不変条件を検証できます。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::fault::FaultInjector;
use crate::domain::{HomestayOrder, OrderSn, OrderStatus};
use crate::ports::{Clock, OrderStore, StoreError};

/// One committed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub sn: OrderSn,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub version: u64,
}

#[derive(Default)]
struct StoreState {
    orders: HashMap<OrderSn, HomestayOrder>,
    history: Vec<StatusTransition>,
}

pub struct InMemoryOrderStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    read_faults: FaultInjector,
    write_faults: FaultInjector,
}

impl InMemoryOrderStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
            read_faults: FaultInjector::new(),
            write_faults: FaultInjector::new(),
        }
    }

    /// Insert or replace an order as-is.
    pub async fn insert(&self, order: HomestayOrder) {
        let mut state = self.state.lock().await;
        state.orders.insert(order.sn.clone(), order);
    }

    /// Payment-success transition `created -> paid`, guarded like any other
    /// write. Returns the paid order, or `None` when the order was no longer
    /// awaiting payment.
    pub async fn mark_paid(&self, sn: &OrderSn) -> Result<Option<HomestayOrder>, StoreError> {
        let order = self.get_order(sn).await?;
        if !order.status.is_awaiting_payment() {
            return Ok(None);
        }
        if !self
            .compare_and_swap_status(sn, OrderStatus::Created, OrderStatus::Paid, order.version)
            .await?
        {
            return Ok(None);
        }
        self.get_order(sn).await.map(Some)
    }

    pub async fn history(&self) -> Vec<StatusTransition> {
        self.state.lock().await.history.clone()
    }

    /// Make the next `n` reads fail with a transient error.
    pub fn fail_next_reads(&self, n: u32) {
        self.read_faults.arm(n);
    }

    /// Make the next `n` writes fail with a transient error.
    pub fn fail_next_writes(&self, n: u32) {
        self.write_faults.arm(n);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, sn: &OrderSn) -> Result<HomestayOrder, StoreError> {
        if self.read_faults.trip() {
            return Err(StoreError::Transient(format!("read of {sn} timed out")));
        }
        let state = self.state.lock().await;
        state
            .orders
            .get(sn)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(sn.clone()))
    }

    async fn compare_and_swap_status(
        &self,
        sn: &OrderSn,
        expected: OrderStatus,
        new: OrderStatus,
        guard: u64,
    ) -> Result<bool, StoreError> {
        if self.write_faults.trip() {
            return Err(StoreError::Transient(format!("write of {sn} timed out")));
        }
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.get_mut(sn) else {
            return Err(StoreError::NotFound(sn.clone()));
        };

        if order.status != expected || order.version != guard {
            tracing::debug!(
                sn = %sn,
                expected = %expected,
                actual = %order.status,
                guard,
                version = order.version,
                "status guard failed"
            );
            return Ok(false);
        }
        if !expected.can_transition_to(new) {
            tracing::warn!(sn = %sn, from = %expected, to = %new, "illegal status transition refused");
            return Ok(false);
        }

        order.status = new;
        order.version += 1;
        order.updated_at = now;
        let transition = StatusTransition {
            sn: sn.clone(),
            from: expected,
            to: new,
            version: order.version,
        };
        state.history.push(transition);
        Ok(true)
    }
}
