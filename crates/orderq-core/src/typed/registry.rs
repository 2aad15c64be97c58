//! TypedRegistry - Handler の登録と管理
//!
//! 起動時に登録（mutable）、実行時は読み取りのみ（Arc で共有）。
//! ロック不要。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::TaskType;

/// RegistryError は TypedRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for task type '{0}' is already registered")]
    AlreadyRegistered(TaskType),
}

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<DeferCloseHomestayOrderPayload, _>(close_handler)?;
///
/// // task_type で DynHandler を取得
/// let handler = registry.get(&TaskType::new(DeferCloseHomestayOrderPayload::TYPE));
/// ```
///
/// - `register::<T, H>` で TypedHandler にラップして DynHandler として保持
/// - kind を追加しても既存の登録には触れない
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<TaskType, Arc<dyn DynHandler>>,
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = TaskType::new(T::TYPE);
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.handlers
            .insert(task_type, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// 登録済みの task_type（ソート済み）
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Outcome, TaskError};
    use crate::typed::TaskContext;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct AlphaTask;

    impl Task for AlphaTask {
        const TYPE: &'static str = "test.alpha.v1";
    }

    #[derive(Serialize, Deserialize)]
    struct BetaTask {
        name: String,
    }

    impl Task for BetaTask {
        const TYPE: &'static str = "test.beta.v1";
    }

    struct Noop;

    #[async_trait]
    impl Handler<AlphaTask> for Noop {
        async fn handle(&self, _task: AlphaTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            Ok(Outcome::completed())
        }
    }

    #[async_trait]
    impl Handler<BetaTask> for Noop {
        async fn handle(&self, _task: BetaTask, _ctx: &TaskContext) -> Result<Outcome, TaskError> {
            Ok(Outcome::completed())
        }
    }

    #[test]
    fn register_then_get() {
        let mut registry = TypedRegistry::new();
        registry.register::<AlphaTask, _>(Noop).unwrap();

        let handler = registry.get(&TaskType::new(AlphaTask::TYPE)).unwrap();
        assert_eq!(handler.task_type(), AlphaTask::TYPE);
        assert!(registry.get(&TaskType::new(BetaTask::TYPE)).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypedRegistry::new();
        registry.register::<AlphaTask, _>(Noop).unwrap();

        let result = registry.register::<AlphaTask, _>(Noop);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t.as_str() == AlphaTask::TYPE));
    }

    #[test]
    fn kinds_are_registered_independently() {
        let mut registry = TypedRegistry::new();
        registry.register::<BetaTask, _>(Noop).unwrap();
        registry.register::<AlphaTask, _>(Noop).unwrap();

        assert_eq!(
            registry.registered_types(),
            vec![TaskType::new(AlphaTask::TYPE), TaskType::new(BetaTask::TYPE)]
        );
        assert_eq!(registry.len(), 2);
    }
}
