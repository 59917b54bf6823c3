use std::time::Duration;

use serde::Serialize;

use crate::observer::EngineState;
use crate::state::{StatusCounts, TaskStatus};

/// Outcome of one `ExecutionEngine::run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub state: EngineState,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    /// Final status of every task, in visit order.
    pub statuses: Vec<(String, TaskStatus)>,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl RunSummary {
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            pending: self.pending,
            in_progress: 0,
            completed: self.completed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, s)| *s)
    }

    /// Finished with every task completed.
    pub fn is_success(&self) -> bool {
        self.state == EngineState::Finished
            && self.failed == 0
            && self.skipped == 0
            && self.pending == 0
    }
}
