use aiwhisper_core::dispatch::{compose_prompt, HandlerContext, InputArtifact, TaskHandler};
use aiwhisper_core::error::TaskError;
use aiwhisper_core::Task;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::extract_fenced;

const FILE_EDIT_PREAMBLE: &str = "You edit existing files. Apply the requested change and reply with the \
complete updated file in a single fenced code block. Do not omit unchanged lines.";

/// Edits one file through the tool invoker: `read_file` on the first input
/// artifact, AI rewrite, `write_file` to the first output artifact (or back
/// to the input when no output is declared).
#[derive(Debug, Default, Clone, Copy)]
pub struct FileEditHandler;

impl FileEditHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskHandler for FileEditHandler {
    fn name(&self) -> &str {
        "file_edit"
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let spec = &task.agent_spec;
        let source = spec.input_artifacts.first().ok_or_else(|| {
            TaskError::ValidationFailed(format!("task '{}' names no file to edit", task.id))
        })?;
        let target = spec.output_artifacts.first().unwrap_or(source);

        let read = ctx
            .tools
            .invoke("read_file", json!({ "path": source }))
            .await?;
        let original = read
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::tool("read_file", "response has no 'content'"))?;

        let inputs = [InputArtifact {
            path: source.clone(),
            content: original.to_string(),
        }];
        let prompt = compose_prompt(&ctx.plan, task, &inputs);
        let request = ctx.request_for(task, &prompt, &[], Some(FILE_EDIT_PREAMBLE))?;
        let response = ctx.chat(&task.id, &request).await?;

        let edited = extract_fenced(&response, None).ok_or_else(|| {
            TaskError::ValidationFailed("model reply contained no fenced file content".into())
        })?;

        ctx.tools
            .invoke("write_file", json!({ "path": target, "content": edited }))
            .await?;
        tracing::info!(task_id = %task.id, path = %target, "file edited");

        Ok(json!({
            "prompt": prompt,
            "response": response,
            "model": request.model,
            "path": target,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Canned;
    use crate::tools::LocalToolbox;
    use aiwhisper_core::dispatch::AiSettings;
    use aiwhisper_core::{Plan, StateManager};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn ctx_for(plan: &str, reply: &str, dir: &TempDir) -> (HandlerContext, Arc<Canned>) {
        let plan = Arc::new(Plan::from_json_str(plan).unwrap());
        let ai = Arc::new(Canned::new(reply));
        let ctx = HandlerContext::new(plan.clone(), StateManager::for_plan(&plan).await)
            .with_ai(ai.clone())
            .with_ai_settings(AiSettings::default())
            .with_tools(Arc::new(LocalToolbox::new(dir.path())));
        (ctx, ai)
    }

    #[tokio::test]
    async fn rewrites_file_in_place() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        let plan = r#"{"plan": [{"id": "edit", "description": "Greet loudly",
            "agent_spec": {"type": "file_edit", "input_artifacts": ["main.py"]}}]}"#;
        let (ctx, ai) = ctx_for(plan, "```python\nprint('HI')\n```", &dir).await;

        let result = FileEditHandler::new()
            .handle(ctx.plan.task("edit").unwrap(), &ctx)
            .await
            .unwrap();

        assert_eq!(result["path"], "main.py");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "print('HI')"
        );
        let requests = ai.requests.lock().unwrap();
        let user = &requests[0].messages.last().unwrap().content;
        assert!(user.contains("print('hi')"));
    }

    #[tokio::test]
    async fn reply_without_fence_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let plan = r#"{"plan": [{"id": "edit",
            "agent_spec": {"type": "file_edit", "input_artifacts": ["a.txt"], "output_artifacts": ["b.txt"]}}]}"#;
        let (ctx, _) = ctx_for(plan, "I changed it for you.", &dir).await;

        let err = FileEditHandler::new()
            .handle(ctx.plan.task("edit").unwrap(), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::ValidationFailed(_)));
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn missing_source_is_a_tool_error() {
        let dir = TempDir::new().unwrap();
        let plan = r#"{"plan": [{"id": "edit",
            "agent_spec": {"type": "file_edit", "input_artifacts": ["nope.rs"]}}]}"#;
        let (ctx, _) = ctx_for(plan, "```\nx\n```", &dir).await;

        let err = FileEditHandler::new()
            .handle(ctx.plan.task("edit").unwrap(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Tool { .. }));
    }
}
