//! Conversation history reconstructed from earlier `ai_interaction` results.

use std::collections::HashSet;

use crate::ai::ChatMessage;
use crate::error::TaskError;
use crate::plan::{Plan, Task, TaskType};
use crate::state::StateManager;

/// One role-tagged message of reconstructed history. Derived on demand,
/// never persisted.
pub type ConversationTurn = ChatMessage;

/// Builds the prior turns for a task from the stored `{prompt, response}`
/// results of its `ai_interaction` ancestors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationHistoryAssembler;

impl ConversationHistoryAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Ancestors are followed through `depends_on` while they are
    /// `ai_interaction` tasks; a dependency of another type ends that branch.
    /// Turns come out deepest ancestor first, each ancestor contributing a
    /// user turn then an assistant turn.
    pub async fn build_history(
        &self,
        task: &Task,
        plan: &Plan,
        state: &StateManager,
    ) -> Result<Vec<ConversationTurn>, TaskError> {
        let chain = ai_ancestors(task, plan);

        let mut turns = Vec::with_capacity(chain.len() * 2);
        for ancestor in chain {
            let unavailable = || TaskError::ContextUnavailable {
                task_id: task.id.clone(),
                ancestor: ancestor.to_string(),
            };

            let result = state
                .get_task_result(ancestor)
                .await
                .ok_or_else(unavailable)?;
            let prompt = result.get("prompt").and_then(|v| v.as_str());
            let response = result.get("response").and_then(|v| v.as_str());
            let (Some(prompt), Some(response)) = (prompt, response) else {
                return Err(unavailable());
            };

            turns.push(ConversationTurn::user(prompt));
            turns.push(ConversationTurn::assistant(response));
        }

        tracing::debug!(task_id = %task.id, turns = turns.len(), "assembled conversation history");
        Ok(turns)
    }
}

/// Post-order walk so every ancestor follows its own dependencies.
fn ai_ancestors<'a>(task: &'a Task, plan: &'a Plan) -> Vec<&'a str> {
    fn visit<'a>(id: &'a str, plan: &'a Plan, seen: &mut HashSet<&'a str>, out: &mut Vec<&'a str>) {
        if !seen.insert(id) {
            return;
        }
        let Some(task) = plan.task(id) else {
            return;
        };
        if *task.task_type() != TaskType::AiInteraction {
            return;
        }
        for dep in &task.depends_on {
            visit(dep, plan, seen, out);
        }
        out.push(id);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dep in &task.depends_on {
        visit(dep, plan, &mut seen, &mut out);
    }
    out
}
