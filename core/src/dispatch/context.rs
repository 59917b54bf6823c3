use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Map, Value};

use super::traits::{NoTools, ToolInvoker, Workspace};
use super::workspace::LocalWorkspace;
use crate::ai::{ChatCompletion, ChatMessage, ChatRequest, StreamChunk};
use crate::config::AiConfig;
use crate::error::TaskError;
use crate::history::ConversationHistoryAssembler;
use crate::observer::{EngineControl, EngineEvent, ObserverRegistry};
use crate::plan::{Plan, Task};
use crate::state::StateManager;

/// Engine-wide AI defaults. A task's `model_preference` overrides them.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub model: Option<String>,
    pub params: Map<String, Value>,
    pub system_prompt: Option<String>,
    pub stream: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: None,
            params: Map::new(),
            system_prompt: None,
            stream: true,
        }
    }
}

impl AiSettings {
    pub fn from_config(cfg: &AiConfig) -> Self {
        Self {
            model: Some(cfg.model.clone()).filter(|m| !m.trim().is_empty()),
            params: cfg.params.clone(),
            system_prompt: cfg.system_prompt.clone(),
            stream: cfg.stream,
        }
    }
}

/// Everything a handler may touch while running one task.
#[derive(Clone)]
pub struct HandlerContext {
    pub run_id: String,
    pub plan: Arc<Plan>,
    pub state: StateManager,
    pub ai: Option<Arc<dyn ChatCompletion>>,
    pub ai_settings: AiSettings,
    pub history: ConversationHistoryAssembler,
    pub workspace: Arc<dyn Workspace>,
    pub tools: Arc<dyn ToolInvoker>,
    pub observers: Arc<ObserverRegistry>,
}

impl HandlerContext {
    /// A context with no AI provider, no tools, no observers and the
    /// current directory as workspace.
    pub fn new(plan: Arc<Plan>, state: StateManager) -> Self {
        Self {
            run_id: String::new(),
            plan,
            state,
            ai: None,
            ai_settings: AiSettings::default(),
            history: ConversationHistoryAssembler::new(),
            workspace: Arc::new(LocalWorkspace::new(".")),
            tools: Arc::new(NoTools),
            observers: Arc::new(ObserverRegistry::new(EngineControl::new())),
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn ChatCompletion>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_ai_settings(mut self, settings: AiSettings) -> Self {
        self.ai_settings = settings;
        self
    }

    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn ai(&self) -> Result<&Arc<dyn ChatCompletion>, TaskError> {
        self.ai
            .as_ref()
            .ok_or_else(|| TaskError::Handler(anyhow::anyhow!("no AI provider configured")))
    }

    pub fn emit(&self, event: EngineEvent) {
        self.observers.notify(&event);
    }

    /// Resolve model and params for `task`: task preference first, then the
    /// engine defaults, then the provider's default model.
    pub fn request_for(
        &self,
        task: &Task,
        prompt: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<ChatRequest, TaskError> {
        let ai = self.ai()?;
        let preference = task.model_preference();

        let model = preference
            .and_then(|p| p.model.clone())
            .or_else(|| self.ai_settings.model.clone())
            .unwrap_or_else(|| ai.default_model().to_string());

        let mut params = self.ai_settings.params.clone();
        if let Some(pref) = preference {
            for (k, v) in &pref.params {
                params.insert(k.clone(), v.clone());
            }
        }

        let system = system_prompt.or(self.ai_settings.system_prompt.as_deref());
        Ok(ChatRequest::build(model, prompt, system, history, params))
    }

    /// Run a completion for `task_id`, streaming when enabled. Deltas are
    /// forwarded to observers as `AiChunk` events.
    pub async fn chat(&self, task_id: &str, request: &ChatRequest) -> Result<String, TaskError> {
        let ai = self.ai()?;
        if !self.ai_settings.stream {
            return Ok(ai.complete(request).await?);
        }

        let mut stream = ai.stream(request).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Delta(delta) => {
                    self.emit(EngineEvent::AiChunk {
                        task_id: task_id.to_string(),
                        delta: delta.clone(),
                    });
                    text.push_str(&delta);
                }
                StreamChunk::Done { .. } => break,
            }
        }
        Ok(text)
    }
}
