use aiwhisper_core::dispatch::{HandlerContext, TaskHandler};
use aiwhisper_core::error::TaskError;
use aiwhisper_core::Task;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Checks that every declared artifact exists and is non-empty.
///
/// Validation criteria are echoed in the result for downstream review; they
/// are not interpreted here.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationHandler;

impl ValidationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskHandler for ValidationHandler {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let spec = &task.agent_spec;
        let mut checked = Vec::new();
        let mut problems = Vec::new();

        for path in spec.input_artifacts.iter().chain(&spec.output_artifacts) {
            if checked.contains(path) {
                continue;
            }
            checked.push(path.clone());

            if !ctx.workspace.artifact_exists(path).await {
                problems.push(format!("{path}: missing"));
                continue;
            }
            match ctx.workspace.read_artifact(path).await {
                Ok(content) if content.trim().is_empty() => {
                    problems.push(format!("{path}: empty"));
                }
                Ok(_) => {}
                Err(e) => problems.push(format!("{path}: {e}")),
            }
        }

        if !problems.is_empty() {
            tracing::warn!(task_id = %task.id, problems = ?problems, "artifact validation failed");
            return Err(TaskError::ValidationFailed(problems.join("; ")));
        }

        Ok(json!({
            "checked": checked,
            "criteria": spec.validation_criteria,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiwhisper_core::dispatch::LocalWorkspace;
    use aiwhisper_core::{Plan, StateManager};
    use std::sync::Arc;
    use tempfile::TempDir;

    const PLAN: &str = r#"{"plan": [
        {"id": "check", "agent_spec": {"type": "validation",
          "input_artifacts": ["src/lib.rs"], "output_artifacts": ["README.md", "src/lib.rs"],
          "validation_criteria": "compiles"}}
    ]}"#;

    async fn run(dir: &TempDir) -> Result<Value, TaskError> {
        let plan = Arc::new(Plan::from_json_str(PLAN).unwrap());
        let ctx = HandlerContext::new(plan.clone(), StateManager::for_plan(&plan).await)
            .with_workspace(Arc::new(LocalWorkspace::new(dir.path())));
        ValidationHandler::new()
            .handle(plan.task("check").unwrap(), &ctx)
            .await
    }

    #[tokio::test]
    async fn passes_when_artifacts_present() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}").unwrap();
        std::fs::write(dir.path().join("README.md"), "# x").unwrap();

        let result = run(&dir).await.unwrap();
        assert_eq!(result["checked"], json!(["src/lib.rs", "README.md"]));
        assert_eq!(result["criteria"], json!(["compiles"]));
    }

    #[tokio::test]
    async fn reports_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "  \n").unwrap();

        let msg = match run(&dir).await.unwrap_err() {
            TaskError::ValidationFailed(msg) => msg,
            other => panic!("unexpected error: {other}"),
        };
        assert!(msg.contains("src/lib.rs: missing"));
        assert!(msg.contains("README.md: empty"));
    }
}
