use std::sync::Mutex;

use aiwhisper_core::observer::{ControlRequest, EngineEvent, EngineObserver};
use indicatif::{ProgressBar, ProgressStyle};

/// Terminal progress bar over terminal task transitions.
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start(total: usize) -> ProgressBar {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        bar
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for ProgressObserver {
    fn name(&self) -> &str {
        "progress"
    }

    fn on_event(&self, event: &EngineEvent) -> ControlRequest {
        let Ok(mut slot) = self.bar.lock() else {
            return ControlRequest::Continue;
        };
        match event {
            EngineEvent::EngineStarted { total_tasks, .. } => {
                *slot = Some(Self::start(*total_tasks));
            }
            EngineEvent::TaskStarted { task_id, .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(task_id.clone());
                }
            }
            EngineEvent::TaskCompleted { .. }
            | EngineEvent::TaskFailed { .. }
            | EngineEvent::TaskSkipped { .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.inc(1);
                }
            }
            EngineEvent::EnginePaused { .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message("paused");
                }
            }
            EngineEvent::EngineStopped { .. } | EngineEvent::EngineFinished { .. } => {
                if let Some(bar) = slot.take() {
                    bar.finish_with_message(event.kind().replace("engine_", ""));
                }
            }
            _ => {}
        }
        ControlRequest::Continue
    }
}
