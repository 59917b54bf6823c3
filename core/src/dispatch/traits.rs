use async_trait::async_trait;
use serde_json::Value;

use super::context::HandlerContext;
use crate::error::TaskError;
use crate::plan::Task;

/// Execution strategy for one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Run `task`, returning the result recorded in the state manager.
    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError>;
}

/// Path-scoped artifact storage.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read_artifact(&self, path: &str) -> Result<String, TaskError>;

    async fn write_artifact(&self, path: &str, content: &str) -> Result<(), TaskError>;

    async fn artifact_exists(&self, path: &str) -> bool;
}

/// Opaque `(tool_name, args) -> result` capability.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, TaskError>;

    fn tool_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Tool invoker with no tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTools;

#[async_trait]
impl ToolInvoker for NoTools {
    async fn invoke(&self, tool: &str, _args: Value) -> Result<Value, TaskError> {
        Err(TaskError::tool(tool, "no tools are available"))
    }
}
