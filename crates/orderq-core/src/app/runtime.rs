use std::sync::Arc;

use crate::domain::{Outcome, TaskEnvelope, TaskError};
use crate::typed::{TaskContext, TypedRegistry};

/// Runtime executes a `TaskEnvelope` by dispatching to the handler registered
/// for its kind tag.
pub struct Runtime {
    registry: Arc<TypedRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<TypedRegistry>) -> Self {
        Self { registry }
    }

    /// Execute one envelope.
    pub async fn execute(
        &self,
        envelope: &TaskEnvelope,
        ctx: &TaskContext,
    ) -> Result<Outcome, TaskError> {
        let task_type = envelope.task_type();
        let handler = self
            .registry
            .get(task_type)
            .ok_or_else(|| TaskError::HandlerNotFound(task_type.clone()))?;

        handler.handle_dyn(envelope.payload(), ctx).await
    }
}
