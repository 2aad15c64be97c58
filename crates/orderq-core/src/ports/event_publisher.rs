//! EventPublisher port - サービス間 pub/sub への送信

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{OrderEvent, TaskError};

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    #[error("relay is closed")]
    Closed,
}

impl From<RelayError> for TaskError {
    fn from(err: RelayError) -> Self {
        TaskError::Delivery(err.to_string())
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: OrderEvent) -> Result<(), RelayError>;
}
