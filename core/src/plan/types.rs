use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::graph::{TaskGraph, TaskLike};
use crate::error::{PlanError, PlanValidationError};

/// Declared kind of work for a task. Unrecognised strings are kept verbatim so
/// a plan still loads; the dispatcher fails just that task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Planning,
    AiInteraction,
    CodeGeneration,
    TestGeneration,
    FileEdit,
    Validation,
    Documentation,
    Analysis,
    Unknown(String),
}

impl TaskType {
    pub const KNOWN: [TaskType; 8] = [
        TaskType::Planning,
        TaskType::AiInteraction,
        TaskType::CodeGeneration,
        TaskType::TestGeneration,
        TaskType::FileEdit,
        TaskType::Validation,
        TaskType::Documentation,
        TaskType::Analysis,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Planning => "planning",
            TaskType::AiInteraction => "ai_interaction",
            TaskType::CodeGeneration => "code_generation",
            TaskType::TestGeneration => "test_generation",
            TaskType::FileEdit => "file_edit",
            TaskType::Validation => "validation",
            TaskType::Documentation => "documentation",
            TaskType::Analysis => "analysis",
            TaskType::Unknown(raw) => raw,
        }
    }
}

impl From<String> for TaskType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "planning" => TaskType::Planning,
            "ai_interaction" => TaskType::AiInteraction,
            "code_generation" => TaskType::CodeGeneration,
            "test_generation" => TaskType::TestGeneration,
            "file_edit" => TaskType::FileEdit,
            "validation" => TaskType::Validation,
            "documentation" => TaskType::Documentation,
            "analysis" => TaskType::Analysis,
            _ => TaskType::Unknown(raw),
        }
    }
}

impl From<TaskType> for String {
    fn from(ty: TaskType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task model override. Plans write either a bare model id or an object
/// such as `{"model": "...", "temperature": 0.2}`; keys other than `model`
/// and `provider` are forwarded as request params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawModelPreference")]
pub struct ModelPreference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawModelPreference {
    Name(String),
    Spec(Map<String, Value>),
}

impl From<RawModelPreference> for ModelPreference {
    fn from(raw: RawModelPreference) -> Self {
        match raw {
            RawModelPreference::Name(name) => ModelPreference {
                model: Some(name).filter(|m| !m.trim().is_empty()),
                params: Map::new(),
            },
            RawModelPreference::Spec(mut map) => {
                let model = map
                    .remove("model")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .filter(|m| !m.trim().is_empty());
                map.remove("provider");
                map.retain(|_, v| !v.is_null());
                ModelPreference { model, params: map }
            }
        }
    }
}

/// What an agent is asked to do for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub input_artifacts: Vec<String>,
    #[serde(default)]
    pub output_artifacts: Vec<String>,
    #[serde(default, deserialize_with = "text_or_lines")]
    pub instructions: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub constraints: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub validation_criteria: Vec<String>,
    #[serde(default)]
    pub model_preference: Option<ModelPreference>,
}

/// A unit of work. The definition is immutable once the plan is loaded; its
/// execution status lives in the `StateManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "step_id", alias = "subtask_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub agent_spec: AgentSpec,
}

impl Task {
    pub fn task_type(&self) -> &TaskType {
        &self.agent_spec.task_type
    }

    pub fn model_preference(&self) -> Option<&ModelPreference> {
        self.agent_spec.model_preference.as_ref()
    }
}

impl TaskLike for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// Raw plan document as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub natural_language_goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_context: Option<String>,
    #[serde(alias = "steps")]
    pub plan: Vec<Task>,
}

/// A validated plan: unique ids, resolvable dependencies, no cycles.
#[derive(Debug, Clone)]
pub struct Plan {
    document: PlanDocument,
    index: HashMap<String, usize>,
    stages: Vec<Vec<String>>,
    visit_order: Vec<String>,
}

impl Plan {
    pub fn from_document(mut document: PlanDocument) -> Result<Self, PlanValidationError> {
        for task in &mut document.plan {
            dedup_in_place(&mut task.depends_on);
        }

        let graph = TaskGraph::from_tasks(&document.plan)?;
        graph.validate()?;
        let stages = graph.topological_sort()?;
        let visit_order = stages.iter().flatten().cloned().collect();

        let index = document
            .plan
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        Ok(Self {
            document,
            index,
            stages,
            visit_order,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, PlanError> {
        let document: PlanDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(document)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn document(&self) -> &PlanDocument {
        &self.document
    }

    pub fn goal(&self) -> &str {
        &self.document.natural_language_goal
    }

    pub fn overall_context(&self) -> Option<&str> {
        self.document.overall_context.as_deref()
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.document.plan
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.document.plan[i])
    }

    pub fn len(&self) -> usize {
        self.document.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.plan.is_empty()
    }

    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    /// Stable topological visit order: stages flattened, declaration order
    /// within a stage.
    pub fn visit_order(&self) -> &[String] {
        &self.visit_order
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

fn text_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => String::new(),
        Some(OneOrMany::One(s)) => s,
        Some(OneOrMany::Many(v)) => v.join("\n"),
    })
}
