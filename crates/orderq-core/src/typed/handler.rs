//! Handler trait - Task を実行する Handler の定義
//!
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::codec::PayloadCodec;
use super::task::Task;
use crate::domain::{Outcome, TaskError, TaskId, TaskType};

/// Delivery metadata passed along with the decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_type: TaskType,
    /// Failed deliveries before this one.
    pub attempt: u32,
    pub worker_id: String,
}

/// Handler は Task を実行して Outcome を返す
///
/// At-least-once 配送なので、同じ task が複数回届いても結果が変わらないように
/// 実装すること。
///
/// # ジェネリクスによる型安全性
/// - `Handler<DeferCloseHomestayOrderPayload>` はその payload しか受け取れない
/// - コンパイル時に Task と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, ctx: &TaskContext) -> Result<Outcome, TaskError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T> を DynHandler に変換することで、
/// HashMap<TaskType, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        payload: &serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<Outcome, TaskError>;

    fn task_type(&self) -> &'static str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: &serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<Outcome, TaskError> {
        let task: T = PayloadCodec::decode(payload)?;
        self.handler.handle(task, ctx).await
    }

    fn task_type(&self) -> &'static str {
        T::TYPE
    }
}
