//! Task type dispatch.
//!
//! ```text
//! Task ──► TaskDispatcher ──(TaskType slot)──► dyn TaskHandler::handle(task, &HandlerContext)
//!                                                 │
//!                 HandlerContext: Plan, StateManager, ChatCompletion, history,
//!                                 Workspace (artifacts), ToolInvoker, observers
//! ```

pub mod ai_interaction;
pub mod context;
pub mod dispatcher;
pub mod traits;
pub mod workspace;

pub use ai_interaction::{compose_prompt, read_inputs, AiInteractionHandler, InputArtifact};
pub use context::{AiSettings, HandlerContext};
pub use dispatcher::TaskDispatcher;
pub use traits::{NoTools, TaskHandler, ToolInvoker, Workspace};
pub use workspace::LocalWorkspace;
