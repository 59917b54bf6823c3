use thiserror::Error;

use super::{PlanError, StateError};

/// Run-level errors. Only structural problems surface here; task failures are
/// recorded in state instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("engine is already running")]
    AlreadyRunning,
}
