pub mod ai;
pub mod engine;
pub mod plan;
pub mod state;
pub mod task;

pub use ai::AiServiceError;
pub use engine::EngineError;
pub use plan::{PlanError, PlanValidationError};
pub use state::StateError;
pub use task::TaskError;
