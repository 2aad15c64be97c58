//! Errors - タスク実行エラーと分類
//!
//! ハンドラが返すエラーは broker への `Fail` の種類を決めます。
//! - retryable: backoff 付きで再配送
//! - permanent: 即座に dead-letter

use thiserror::Error;

use super::TaskType;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的なエラー（リトライ推奨）
    Transient,
    /// 恒久的なエラー（リトライ無意味）
    Permanent,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("concurrent modification on order {sn}")]
    ConcurrentModification { sn: String },

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    #[error("permanent payload error: {0}")]
    PermanentPayload(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("handler not found for task_type={0}")]
    HandlerNotFound(TaskType),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::TransientStore(_)
            | TaskError::ConcurrentModification { .. }
            | TaskError::Delivery(_)
            | TaskError::Panicked(_)
            | TaskError::TimedOut(_) => ErrorKind::Transient,
            TaskError::NotFound(_)
            | TaskError::ExhaustedRetries { .. }
            | TaskError::PermanentPayload(_)
            | TaskError::HandlerNotFound(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
