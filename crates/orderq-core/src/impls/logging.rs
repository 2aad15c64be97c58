//! Collaborators that only log (and remember what they were asked to do).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::fault::FaultInjector;
use crate::domain::OrderSn;
use crate::ports::{Inventory, InventoryError, Notifier, NotifyError};

/// Inventory that logs hold releases.
#[derive(Default)]
pub struct LoggingInventory {
    releases: Mutex<HashMap<OrderSn, u32>>,
    faults: FaultInjector,
}

impl LoggingInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the hold for `sn` was released.
    pub async fn release_count(&self, sn: &OrderSn) -> u32 {
        self.releases.lock().await.get(sn).copied().unwrap_or(0)
    }

    pub fn fail_next_releases(&self, n: u32) {
        self.faults.arm(n);
    }
}

#[async_trait]
impl Inventory for LoggingInventory {
    async fn release_hold(&self, sn: &OrderSn) -> Result<(), InventoryError> {
        if self.faults.trip() {
            return Err(InventoryError(format!("inventory service rejected {sn}")));
        }
        *self.releases.lock().await.entry(sn.clone()).or_insert(0) += 1;
        tracing::info!(sn = %sn, "inventory hold released");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub user_id: i64,
    pub message: String,
}

/// Notifier that logs messages instead of delivering them.
#[derive(Default)]
pub struct LoggingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    faults: FaultInjector,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }

    pub fn fail_next_sends(&self, n: u32) {
        self.faults.arm(n);
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, user_id: i64, message: &str) -> Result<(), NotifyError> {
        if self.faults.trip() {
            return Err(NotifyError {
                user_id,
                reason: "notification gateway unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(SentNotification {
            user_id,
            message: message.to_string(),
        });
        tracing::info!(user_id, body = message, "notification sent");
        Ok(())
    }
}
