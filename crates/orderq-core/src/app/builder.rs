//! AppBuilder - handler 登録と起動時検証
//!
//! - Builder パターン
//! - 起動時検証（Fail-fast 設計）: 期待した kind に handler が無ければ起動しない

use std::sync::Arc;
use std::time::Duration;

use super::runtime::Runtime;
use super::worker_loop::WorkerPool;
use crate::domain::TaskType;
use crate::queue::Broker;
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing task types: {0:?}; these tasks were expected but not registered")]
    MissingTaskTypes(Vec<TaskType>),
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<DeferCloseHomestayOrderPayload, _>(close_handler)?
///     .register::<PaySuccessNotifyUserPayload, _>(notify_handler)?
///     .expect_tasks(&[
///         DeferCloseHomestayOrderPayload::TYPE,
///         PaySuccessNotifyUserPayload::TYPE,
///     ])
///     .build()?;
/// ```
pub struct AppBuilder {
    registry: TypedRegistry,
    expected_tasks: Option<Vec<TaskType>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_tasks: None,
        }
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| TaskType::new(*t)).collect());
        self
    }

    /// 期待集合 ⊆ 登録済み集合 をチェックして App を生成
    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing_tasks: Vec<TaskType> = expected_tasks
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }

        tracing::info!(
            task_types = ?self.registry.registered_types(),
            "handlers registered"
        );
        Ok(App {
            runtime: Arc::new(Runtime::new(Arc::new(self.registry))),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は検証済みの handler 集合を持つランタイム
pub struct App {
    runtime: Arc<Runtime>,
}

impl App {
    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }

    /// Start `concurrency` workers pulling from `broker`.
    pub fn spawn_workers(
        &self,
        concurrency: usize,
        broker: Arc<dyn Broker>,
        poll_interval: Duration,
    ) -> WorkerPool {
        WorkerPool::spawn(concurrency, broker, self.runtime(), poll_interval)
    }
}
