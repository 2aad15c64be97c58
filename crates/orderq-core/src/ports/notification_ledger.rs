//! NotificationLedger port - 支払成功通知の冪等性台帳
//!
//! order `sn` ごとに「通知済み」を記録します。注文が有効な間は削除しません。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order_store::StoreError;
use crate::domain::{OrderSn, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub sn: OrderSn,
    pub user_id: i64,
    /// The task instance that delivered it (there may have been duplicates).
    pub task_id: TaskId,
    pub delivered_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    async fn get(&self, sn: &OrderSn) -> Result<Option<NotificationRecord>, StoreError>;

    /// Single-writer-wins: returns `Ok(false)` if a record already existed.
    async fn put(&self, record: NotificationRecord) -> Result<bool, StoreError>;
}
