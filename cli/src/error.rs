use aiwhisper_core::error::{AiServiceError, EngineError, PlanError, StateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    Plan(#[from] PlanError),
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Ai(#[from] AiServiceError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Process exit code for a failed command.
///
/// 2 (run finished with failed, skipped or pending tasks) is returned as a
/// normal exit code, not as an error.
pub fn exit_code_for_error(e: &CliError) -> i32 {
    // 11: config error
    // 12: plan validation error
    // 20: io / state / provider error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Plan(pe) => plan_exit_code(pe),
        CliError::State(_) => 20,
        CliError::Engine(ee) => match ee {
            EngineError::Plan(pe) => plan_exit_code(pe),
            EngineError::State(_) => 20,
            EngineError::AlreadyRunning => 50,
        },
        CliError::Ai(AiServiceError::Auth(_)) => 11,
        CliError::Ai(_) => 20,
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn plan_exit_code(e: &PlanError) -> i32 {
    match e {
        PlanError::Io { .. } => 20,
        PlanError::Parse(_) | PlanError::Validation(_) => 12,
    }
}
