use crate::plan::Task;
use crate::state::{StateManager, TaskStatus};

/// Whether a task may run given the state of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every dependency completed (or there are none).
    Ready,
    /// Some dependencies are unfinished and none failed or was skipped.
    Blocked { waiting_on: Vec<String> },
    /// A dependency failed or was skipped; the first such one in
    /// declaration order is reported.
    Skip {
        dependency: String,
        status: TaskStatus,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn resolve(&self, task: &Task, state: &StateManager) -> Resolution {
        let mut waiting_on = Vec::new();

        for dep in &task.depends_on {
            match state.get_task_status(dep).await {
                Some(TaskStatus::Completed) => {}
                Some(status @ (TaskStatus::Failed | TaskStatus::Skipped)) => {
                    return Resolution::Skip {
                        dependency: dep.clone(),
                        status,
                    };
                }
                Some(TaskStatus::Pending | TaskStatus::InProgress) | None => {
                    waiting_on.push(dep.clone());
                }
            }
        }

        if waiting_on.is_empty() {
            Resolution::Ready
        } else {
            Resolution::Blocked { waiting_on }
        }
    }
}
