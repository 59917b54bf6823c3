use thiserror::Error;

use crate::state::TaskStatus;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid transition for task '{task_id}' from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("timed out after {waited_ms}ms waiting for snapshot lock {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error("snapshot io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
