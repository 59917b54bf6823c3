use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use aiwhisper_core::ai::{AiServiceClient, ChatCompletion};
use aiwhisper_core::config::{AppConfig, OutputFormat};
use aiwhisper_core::dispatch::{AiInteractionHandler, LocalWorkspace, TaskDispatcher, ToolInvoker, Workspace};
use aiwhisper_core::observer::EngineObserver;
use aiwhisper_core::TaskType;

use crate::handlers::{FileEditHandler, GenerationHandler, PlanningHandler, ValidationHandler};
use crate::observers::{JsonlEventsObserver, ProgressObserver, TextRendererObserver};
use crate::tools::LocalToolbox;

/// Dispatcher with a handler for every known task type.
pub fn build_dispatcher() -> Result<TaskDispatcher> {
    let mut dispatcher = TaskDispatcher::new();
    dispatcher.register(TaskType::AiInteraction, Arc::new(AiInteractionHandler))?;
    dispatcher.register(TaskType::Planning, Arc::new(PlanningHandler::new()))?;
    dispatcher.register(TaskType::Validation, Arc::new(ValidationHandler::new()))?;
    dispatcher.register(TaskType::FileEdit, Arc::new(FileEditHandler::new()))?;
    for task_type in [
        TaskType::CodeGeneration,
        TaskType::TestGeneration,
        TaskType::Documentation,
        TaskType::Analysis,
    ] {
        dispatcher.register(
            task_type.clone(),
            Arc::new(GenerationHandler::new(task_type)),
        )?;
    }
    Ok(dispatcher)
}

pub fn build_ai(cfg: &AppConfig) -> Result<Arc<dyn ChatCompletion>> {
    let client = AiServiceClient::from_config(&cfg.ai).context("failed to build AI client")?;
    Ok(Arc::new(client))
}

pub fn build_workspace(root: &Path) -> Arc<dyn Workspace> {
    Arc::new(LocalWorkspace::new(root))
}

pub fn build_tools(root: &Path) -> Arc<dyn ToolInvoker> {
    Arc::new(LocalToolbox::new(root))
}

/// Console renderer for `format`, plus the optional JSONL log and
/// progress bar.
pub fn build_observers(
    format: OutputFormat,
    events_path: Option<&str>,
    progress: bool,
    show_chunks: bool,
) -> Result<Vec<Arc<dyn EngineObserver>>> {
    let mut observers: Vec<Arc<dyn EngineObserver>> = Vec::new();
    match format {
        OutputFormat::Text => {
            observers.push(Arc::new(TextRendererObserver::new(show_chunks && !progress)));
            if progress {
                observers.push(Arc::new(ProgressObserver::new()));
            }
        }
        OutputFormat::Jsonl => observers.push(Arc::new(JsonlEventsObserver::stdout(show_chunks))),
    }
    if let Some(path) = events_path.filter(|p| !p.trim().is_empty()) {
        let observer = JsonlEventsObserver::create(path, false)
            .with_context(|| format!("cannot open events file {path}"))?;
        observers.push(Arc::new(observer));
    }
    Ok(observers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn every_known_type_has_a_handler() {
        let dispatcher = build_dispatcher().unwrap();
        for task_type in TaskType::KNOWN.iter() {
            assert!(dispatcher.handler_for(task_type).is_some(), "{task_type}");
        }
    }

    #[test]
    fn observers_follow_output_settings() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("events.jsonl");
        let observers =
            build_observers(OutputFormat::Text, events.to_str(), true, true).unwrap();
        let names: Vec<&str> = observers.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["text-renderer", "progress", "jsonl-events"]);

        let observers = build_observers(OutputFormat::Jsonl, None, true, false).unwrap();
        assert_eq!(observers.len(), 1);
    }
}
