use aiwhisper_core::dispatch::{compose_prompt, read_inputs, HandlerContext, TaskHandler};
use aiwhisper_core::error::TaskError;
use aiwhisper_core::{Task, TaskType};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::extract_fenced;

/// AI generation for `code_generation`, `test_generation`, `documentation`
/// and `analysis` tasks. Each type gets its own system preamble; code
/// types keep only the fenced code from the reply.
pub struct GenerationHandler {
    task_type: TaskType,
}

impl GenerationHandler {
    pub fn new(task_type: TaskType) -> Self {
        Self { task_type }
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    fn preamble(&self) -> &'static str {
        match self.task_type {
            TaskType::CodeGeneration => {
                "You are a senior software engineer. Reply with the complete source file in a single fenced code block."
            }
            TaskType::TestGeneration => {
                "You write thorough, deterministic automated tests. Reply with the complete test file in a single fenced code block."
            }
            TaskType::Documentation => {
                "You are a technical writer. Reply with clear Markdown documentation only."
            }
            _ => "You are a careful analyst. Reply with a structured Markdown analysis.",
        }
    }

    fn keeps_code_only(&self) -> bool {
        matches!(
            self.task_type,
            TaskType::CodeGeneration | TaskType::TestGeneration
        )
    }
}

#[async_trait]
impl TaskHandler for GenerationHandler {
    fn name(&self) -> &str {
        self.task_type.as_str()
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let inputs = read_inputs(task, ctx).await?;
        let prompt = compose_prompt(&ctx.plan, task, &inputs);
        let history = ctx
            .history
            .build_history(task, &ctx.plan, &ctx.state)
            .await?;

        let request = ctx.request_for(task, &prompt, &history, Some(self.preamble()))?;
        let response = ctx.chat(&task.id, &request).await?;

        let content = if self.keeps_code_only() {
            extract_fenced(&response, None).unwrap_or_else(|| response.clone())
        } else {
            response.clone()
        };

        let outputs = &task.agent_spec.output_artifacts;
        for path in outputs {
            ctx.workspace.write_artifact(path, &content).await?;
        }
        tracing::debug!(task_id = %task.id, artifacts = outputs.len(), "generation output written");

        Ok(json!({
            "prompt": prompt,
            "response": response,
            "model": request.model,
            "artifacts": outputs,
        }))
    }
}
