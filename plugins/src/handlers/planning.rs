use aiwhisper_core::dispatch::{compose_prompt, read_inputs, HandlerContext, TaskHandler};
use aiwhisper_core::error::TaskError;
use aiwhisper_core::plan::PlanDocument;
use aiwhisper_core::{Plan, Task};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::extract_fenced;

const PLANNING_PREAMBLE: &str = "You break goals into executable plans. Reply with a single JSON object \
{\"natural_language_goal\": string, \"overall_context\": string, \"plan\": [{\"step_id\": string, \
\"description\": string, \"depends_on\": [string], \"agent_spec\": {\"type\": string, \
\"input_artifacts\": [string], \"output_artifacts\": [string], \"instructions\": string}}]} \
inside a ```json fenced block.";

/// Asks the AI for a sub-plan and validates it like any loaded plan.
/// The validated document is written to every output artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanningHandler;

impl PlanningHandler {
    pub fn new() -> Self {
        Self
    }
}

/// Pull a plan document out of a model reply: a ```json block, any fenced
/// block, or the outermost `{...}` span.
pub fn parse_generated_plan(response: &str) -> Result<Plan, TaskError> {
    let candidate = extract_fenced(response, Some("json"))
        .or_else(|| {
            let start = response.find('{')?;
            let end = response.rfind('}')?;
            (start < end).then(|| response[start..=end].to_string())
        })
        .unwrap_or_else(|| response.trim().to_string());

    Ok(Plan::from_json_str(&candidate)?)
}

#[async_trait]
impl TaskHandler for PlanningHandler {
    fn name(&self) -> &str {
        "planning"
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<Value, TaskError> {
        let inputs = read_inputs(task, ctx).await?;
        let prompt = compose_prompt(&ctx.plan, task, &inputs);
        let request = ctx.request_for(task, &prompt, &[], Some(PLANNING_PREAMBLE))?;
        let response = ctx.chat(&task.id, &request).await?;

        let plan = parse_generated_plan(&response)?;
        let document: &PlanDocument = plan.document();
        tracing::info!(task_id = %task.id, steps = plan.len(), "generated plan validated");

        let rendered = serde_json::to_string_pretty(document)
            .map_err(|e| TaskError::Handler(anyhow::anyhow!("cannot render plan: {e}")))?;
        for path in &task.agent_spec.output_artifacts {
            ctx.workspace.write_artifact(path, &rendered).await?;
        }

        Ok(json!({
            "prompt": prompt,
            "response": response,
            "model": request.model,
            "plan": document,
            "stages": plan.stages(),
        }))
    }
}
