use thiserror::Error;

/// Structural problems found while validating a plan. Always fatal and raised
/// before any task executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("Task at position {0} has an empty id")]
    EmptyTaskId(usize),

    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Task '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
}

/// Errors raised while loading a plan document.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid plan JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("plan validation failed: {0}")]
    Validation(#[from] PlanValidationError),
}
