use std::sync::Arc;

use serde_json::Value;

use super::ai_interaction::AiInteractionHandler;
use super::context::HandlerContext;
use super::traits::TaskHandler;
use crate::error::TaskError;
use crate::plan::{Task, TaskType};

type Slot = Option<Arc<dyn TaskHandler>>;

/// One handler slot per task type. Adding a `TaskType` variant fails to
/// compile until a slot is added here.
#[derive(Default, Clone)]
pub struct TaskDispatcher {
    planning: Slot,
    ai_interaction: Slot,
    code_generation: Slot,
    test_generation: Slot,
    file_edit: Slot,
    validation: Slot,
    documentation: Slot,
    analysis: Slot,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the built-in `ai_interaction` handler.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.ai_interaction = Some(Arc::new(AiInteractionHandler));
        dispatcher
    }

    /// Install `handler` for `task_type`, replacing any previous one.
    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), TaskError> {
        let name = handler.name().to_string();
        match self.slot_mut(&task_type) {
            Some(slot) => {
                *slot = Some(handler);
                tracing::debug!(task_type = %task_type, handler = %name, "handler registered");
                Ok(())
            }
            None => Err(TaskError::UnknownTaskType(task_type.to_string())),
        }
    }

    pub fn with_handler(
        mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, TaskError> {
        self.register(task_type, handler)?;
        Ok(self)
    }

    pub fn handler_for(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.slot(task_type).and_then(|slot| slot.as_ref())
    }

    /// Types with a handler installed, in `TaskType::KNOWN` order.
    pub fn registered_types(&self) -> Vec<TaskType> {
        TaskType::KNOWN
            .iter()
            .filter(|t| self.handler_for(t).is_some())
            .cloned()
            .collect()
    }

    /// Run `task` through the handler for its type. Unknown or unregistered
    /// types fail that task only.
    pub async fn dispatch(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let task_type = task.task_type();
        let handler = self
            .handler_for(task_type)
            .ok_or_else(|| TaskError::UnknownTaskType(task_type.to_string()))?;

        tracing::debug!(task_id = %task.id, task_type = %task_type, handler = handler.name(), "dispatching task");
        handler.handle(task, ctx).await
    }

    fn slot(&self, task_type: &TaskType) -> Option<&Slot> {
        match task_type {
            TaskType::Planning => Some(&self.planning),
            TaskType::AiInteraction => Some(&self.ai_interaction),
            TaskType::CodeGeneration => Some(&self.code_generation),
            TaskType::TestGeneration => Some(&self.test_generation),
            TaskType::FileEdit => Some(&self.file_edit),
            TaskType::Validation => Some(&self.validation),
            TaskType::Documentation => Some(&self.documentation),
            TaskType::Analysis => Some(&self.analysis),
            TaskType::Unknown(_) => None,
        }
    }

    fn slot_mut(&mut self, task_type: &TaskType) -> Option<&mut Slot> {
        match task_type {
            TaskType::Planning => Some(&mut self.planning),
            TaskType::AiInteraction => Some(&mut self.ai_interaction),
            TaskType::CodeGeneration => Some(&mut self.code_generation),
            TaskType::TestGeneration => Some(&mut self.test_generation),
            TaskType::FileEdit => Some(&mut self.file_edit),
            TaskType::Validation => Some(&mut self.validation),
            TaskType::Documentation => Some(&mut self.documentation),
            TaskType::Analysis => Some(&mut self.analysis),
            TaskType::Unknown(_) => None,
        }
    }
}
