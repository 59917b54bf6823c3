//! Dependency-aware execution.
//!
//! ```text
//! Plan.visit_order ──► pass ──► DependencyResolver ──┬─ Skip    ─► skipped
//!        ▲                                           ├─ Blocked ─► next pass
//!        └──────────── deferred tasks ◄──────────────┘
//!                                                    └─ Ready   ─► control check ─► dispatch
//!                                                                  (pause/stop)     ─► completed | failed
//! ```

pub mod engine;
pub mod resolver;
pub mod types;

pub use engine::{ExecutionEngine, ExecutionEngineBuilder};
pub use resolver::{DependencyResolver, Resolution};
pub use types::RunSummary;
