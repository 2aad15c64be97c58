//! PayloadCodec - payload (JSON) と Task の相互変換

use serde::Deserialize;
use thiserror::Error;

use super::task::Task;
use crate::domain::{NewTask, TaskEnvelope, TaskError, TaskType};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {task_type}: {source}")]
    Encode {
        task_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {task_type}: {source}")]
    Decode {
        task_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("task kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: TaskType,
    },
}

/// 壊れた payload は何度リトライしても直らない
impl From<CodecError> for TaskError {
    fn from(err: CodecError) -> Self {
        TaskError::PermanentPayload(err.to_string())
    }
}

/// PayloadCodec は Task <-> JSON payload の変換を一箇所にまとめたもの
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl PayloadCodec {
    /// Task を broker に渡せる形にエンコード
    pub fn encode<T: Task>(task: &T) -> Result<NewTask, CodecError> {
        let payload = serde_json::to_value(task).map_err(|source| CodecError::Encode {
            task_type: T::TYPE,
            source,
        })?;
        Ok(NewTask::new(TaskType::new(T::TYPE), payload))
    }

    /// payload を T にデシリアライズ
    pub fn decode<T: Task>(payload: &serde_json::Value) -> Result<T, CodecError> {
        T::deserialize(payload).map_err(|source| CodecError::Decode {
            task_type: T::TYPE,
            source,
        })
    }

    /// kind tag を確認してから decode
    pub fn decode_envelope<T: Task>(envelope: &TaskEnvelope) -> Result<T, CodecError> {
        if envelope.task_type().as_str() != T::TYPE {
            return Err(CodecError::KindMismatch {
                expected: T::TYPE,
                actual: envelope.task_type().clone(),
            });
        }
        Self::decode(envelope.payload())
    }
}
