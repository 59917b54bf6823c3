use async_trait::async_trait;
use serde_json::{json, Value};

use super::context::HandlerContext;
use super::traits::TaskHandler;
use crate::error::TaskError;
use crate::plan::{Plan, Task};

/// An input artifact read for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArtifact {
    pub path: String,
    pub content: String,
}

/// Prompt layout: plan goal and context, the task itself, its instructions,
/// constraints and validation criteria, then each input artifact fenced.
pub fn compose_prompt(plan: &Plan, task: &Task, inputs: &[InputArtifact]) -> String {
    let spec = &task.agent_spec;
    let mut sections: Vec<String> = Vec::new();

    if !plan.goal().trim().is_empty() {
        sections.push(format!("# Goal\n{}", plan.goal().trim()));
    }
    if let Some(ctx) = plan.overall_context().filter(|c| !c.trim().is_empty()) {
        sections.push(format!("# Context\n{}", ctx.trim()));
    }

    let mut header = format!("# Task {}", task.id);
    if !task.description.trim().is_empty() {
        header.push('\n');
        header.push_str(task.description.trim());
    }
    sections.push(header);

    if !spec.instructions.trim().is_empty() {
        sections.push(format!("## Instructions\n{}", spec.instructions.trim()));
    }
    if !spec.constraints.is_empty() {
        sections.push(format!("## Constraints\n{}", bullets(&spec.constraints)));
    }
    if !spec.validation_criteria.is_empty() {
        sections.push(format!(
            "## Validation criteria\n{}",
            bullets(&spec.validation_criteria)
        ));
    }
    for input in inputs {
        sections.push(format!(
            "## Input: {}\n```\n{}\n```",
            input.path,
            input.content.trim_end()
        ));
    }

    sections.join("\n\n")
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read every declared input artifact through the workspace.
pub async fn read_inputs(task: &Task, ctx: &HandlerContext) -> Result<Vec<InputArtifact>, TaskError> {
    let mut inputs = Vec::with_capacity(task.agent_spec.input_artifacts.len());
    for path in &task.agent_spec.input_artifacts {
        let content = ctx.workspace.read_artifact(path).await?;
        inputs.push(InputArtifact {
            path: path.clone(),
            content,
        });
    }
    Ok(inputs)
}

/// Built-in handler for `ai_interaction` tasks. Returns
/// `{prompt, response, model}`; the response is also written to every
/// declared output artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct AiInteractionHandler;

#[async_trait]
impl TaskHandler for AiInteractionHandler {
    fn name(&self) -> &str {
        "ai_interaction"
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let inputs = read_inputs(task, ctx).await?;
        let prompt = compose_prompt(&ctx.plan, task, &inputs);
        let history = ctx
            .history
            .build_history(task, &ctx.plan, &ctx.state)
            .await?;

        let request = ctx.request_for(task, &prompt, &history, None)?;
        let response = ctx.chat(&task.id, &request).await?;

        for path in &task.agent_spec.output_artifacts {
            ctx.workspace.write_artifact(path, &response).await?;
        }

        Ok(json!({
            "prompt": prompt,
            "response": response,
            "model": request.model,
        }))
    }
}
