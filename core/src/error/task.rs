use thiserror::Error;

use super::{AiServiceError, PlanError, StateError};

/// Per-task failures. The engine records these against the task and keeps
/// going; they never abort the run.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("no handler for task type '{0}'")]
    UnknownTaskType(String),

    #[error("conversation context unavailable for task '{task_id}': ancestor '{ancestor}' has no stored result")]
    ContextUnavailable { task_id: String, ancestor: String },

    #[error("AI service error: {0}")]
    Ai(#[from] AiServiceError),

    #[error("artifact error on {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("generated plan is invalid: {0}")]
    InvalidGeneratedPlan(#[from] PlanError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Handler(#[from] anyhow::Error),
}

impl TaskError {
    pub fn artifact(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Artifact {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.to_string(),
        }
    }
}
