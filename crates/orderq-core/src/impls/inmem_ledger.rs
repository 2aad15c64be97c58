//! InMemoryNotificationLedger - 通知済み記録
//!
//! sn ごとに 1 件。最初の `put` だけが勝ちます（single-writer-wins）。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::fault::FaultInjector;
use crate::domain::OrderSn;
use crate::ports::{NotificationLedger, NotificationRecord, StoreError};

#[derive(Default)]
pub struct InMemoryNotificationLedger {
    records: Mutex<HashMap<OrderSn, NotificationRecord>>,
    write_faults: FaultInjector,
}

impl InMemoryNotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Make the next `n` puts fail with a transient error.
    pub fn fail_next_puts(&self, n: u32) {
        self.write_faults.arm(n);
    }
}

#[async_trait]
impl NotificationLedger for InMemoryNotificationLedger {
    async fn get(&self, sn: &OrderSn) -> Result<Option<NotificationRecord>, StoreError> {
        Ok(self.records.lock().await.get(sn).cloned())
    }

    async fn put(&self, record: NotificationRecord) -> Result<bool, StoreError> {
        if self.write_faults.trip() {
            return Err(StoreError::Transient(format!(
                "ledger write for {} timed out",
                record.sn
            )));
        }
        let mut records = self.records.lock().await;
        if records.contains_key(&record.sn) {
            return Ok(false);
        }
        records.insert(record.sn.clone(), record);
        Ok(true)
    }
}
