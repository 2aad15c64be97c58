//! Inventory port - 在庫サービスへの窓口
//!
//! クローズ成功時に一度だけ呼ばれます。失敗しても close の ack は妨げません
//! （ログに残し、在庫の整合は別の仕組みに任せる）。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::OrderSn;

#[derive(Debug, Clone, Error)]
#[error("inventory release failed: {0}")]
pub struct InventoryError(pub String);

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn release_hold(&self, sn: &OrderSn) -> Result<(), InventoryError>;
}
