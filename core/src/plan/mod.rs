//! Plan model: task definitions as parsed from a plan document, plus the
//! validated dependency graph used by the engine.
//!
//! ```text
//! plan.json
//!   ↓ serde
//! PlanDocument { natural_language_goal, overall_context, plan: Vec<Task> }
//!   ↓ Plan::from_document
//! TaskGraph::from_tasks() → validate() → topological_sort()
//!   ↓
//! Plan { document, stages, visit_order }
//! ```

mod graph;
mod types;

pub use graph::{TaskGraph, TaskLike};
pub use types::{AgentSpec, ModelPreference, Plan, PlanDocument, Task, TaskType};
