//! Task status transition rules.

use super::types::TaskStatus;

pub struct StateTransition;

impl StateTransition {
    /// Whether `from -> to` is a legal forward move. Re-applying the current
    /// status is always allowed. Moving a task back to `Pending` only happens
    /// through an explicit reset, never through this check.
    pub fn is_valid(from: TaskStatus, to: TaskStatus) -> bool {
        if from == to {
            return true;
        }

        matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Skipped)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }

    pub fn is_terminal(status: TaskStatus) -> bool {
        status.is_terminal()
    }

    pub fn description(status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending => "waiting for dependencies or dispatch",
            TaskStatus::InProgress => "handler running",
            TaskStatus::Completed => "finished successfully",
            TaskStatus::Failed => "handler returned an error",
            TaskStatus::Skipped => "a dependency failed or was skipped",
        }
    }
}
