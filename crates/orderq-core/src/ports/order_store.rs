//! OrderStore port - 注文ストア（正本）
//!
//! このクレートは注文を所有しません。読み取りと条件付きのステータス変更だけを行います。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{HomestayOrder, OrderSn, OrderStatus, TaskError};

/// 「見つからない」と「一時的な障害」を区別できること
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(OrderSn),

    #[error("store unavailable: {0}")]
    Transient(String),
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(sn) => TaskError::NotFound(format!("order {sn}")),
            StoreError::Transient(msg) => TaskError::TransientStore(msg),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, sn: &OrderSn) -> Result<HomestayOrder, StoreError>;

    /// `expected -> new` を `guard`（読み取り時の version）が一致する場合のみ適用する。
    ///
    /// Returns `Ok(false)` when the guard or the expected status no longer
    /// matches (someone else changed the row since it was read).
    async fn compare_and_swap_status(
        &self,
        sn: &OrderSn,
        expected: OrderStatus,
        new: OrderStatus,
        guard: u64,
    ) -> Result<bool, StoreError>;
}
