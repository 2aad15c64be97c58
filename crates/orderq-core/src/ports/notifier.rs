//! Notifier port - ユーザー通知の配送

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskError;

#[derive(Debug, Clone, Error)]
#[error("send to user {user_id} failed: {reason}")]
pub struct NotifyError {
    pub user_id: i64,
    pub reason: String,
}

impl From<NotifyError> for TaskError {
    fn from(err: NotifyError) -> Self {
        TaskError::Delivery(err.to_string())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: i64, message: &str) -> Result<(), NotifyError>;
}
