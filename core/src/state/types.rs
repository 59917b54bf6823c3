use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution status of a task.
///
/// ```text
/// Pending -> InProgress -> Completed
///                      \-> Failed
///         \-> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable execution record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskState {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::pending()
    }
}

/// State change notifications.
#[derive(Debug, Clone, Serialize)]
pub enum StateEvent {
    TaskStateChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    TaskReset {
        task_id: String,
        from: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    SnapshotSaved {
        path: String,
        timestamp: DateTime<Utc>,
    },
    SnapshotLoaded {
        path: String,
        task_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl StateEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TaskStateChanged { timestamp, .. }
            | Self::TaskReset { timestamp, .. }
            | Self::SnapshotSaved { timestamp, .. }
            | Self::SnapshotLoaded { timestamp, .. } => *timestamp,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskStateChanged { task_id, .. } | Self::TaskReset { task_id, .. } => {
                Some(task_id)
            }
            _ => None,
        }
    }
}
