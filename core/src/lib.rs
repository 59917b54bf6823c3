//! aiwhisper-core: plan validation, task state, AI provider access and the
//! dependency-aware execution engine.

pub mod ai;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod history;
pub mod observer;
pub mod plan;
pub mod state;

pub use engine::{ExecutionEngine, ExecutionEngineBuilder, RunSummary};
pub use plan::{Plan, Task, TaskType};
pub use state::{StateManager, TaskState, TaskStatus};
