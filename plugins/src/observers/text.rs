use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use aiwhisper_core::observer::{ControlRequest, EngineEvent, EngineObserver};

const RESULT_PREVIEW: usize = 160;

/// Human-readable event lines on stdout. Streamed AI chunks are printed
/// inline; the next line starts on a fresh row.
pub struct TextRendererObserver {
    show_chunks: bool,
    mid_line: AtomicBool,
}

impl TextRendererObserver {
    pub fn new(show_chunks: bool) -> Self {
        Self {
            show_chunks,
            mid_line: AtomicBool::new(false),
        }
    }

    pub fn format_event(&self, event: &EngineEvent) -> Option<String> {
        let line = match event {
            EngineEvent::EngineStarted {
                run_id,
                goal,
                total_tasks,
                ..
            } => format!("RUN START {} (tasks: {}) {}", run_id, total_tasks, goal),
            EngineEvent::TaskStarted {
                task_id, task_type, ..
            } => format!("TASK START {} ({})", task_id, task_type),
            EngineEvent::TaskCompleted {
                task_id, result, ..
            } => format!("TASK OK {} {}", task_id, preview(&result.to_string())),
            EngineEvent::TaskFailed { task_id, error, .. } => {
                format!("TASK FAILED {}: {}", task_id, error)
            }
            EngineEvent::TaskSkipped {
                task_id, reason, ..
            } => format!("TASK SKIPPED {}: {}", task_id, reason),
            EngineEvent::TaskDeferred {
                task_id,
                waiting_on,
                ..
            } => format!("TASK WAITING {} on {}", task_id, waiting_on.join(", ")),
            EngineEvent::AiChunk { .. } => return None,
            EngineEvent::EnginePaused { .. } => "PAUSED".to_string(),
            EngineEvent::EngineResumed { .. } => "RESUMED".to_string(),
            EngineEvent::EngineStopped { pending, .. } => {
                format!("STOPPED ({} tasks pending)", pending)
            }
            EngineEvent::EngineFinished {
                run_id,
                completed,
                failed,
                skipped,
                pending,
                duration_ms,
                ..
            } => format!(
                "RUN END {} (completed {}, failed {}, skipped {}, pending {}, duration {}ms)",
                run_id, completed, failed, skipped, pending, duration_ms
            ),
        };
        Some(line)
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() <= RESULT_PREVIEW {
        return s.to_string();
    }
    let mut out: String = s.chars().take(RESULT_PREVIEW).collect();
    out.push_str("...");
    out
}

impl EngineObserver for TextRendererObserver {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn on_event(&self, event: &EngineEvent) -> ControlRequest {
        if let EngineEvent::AiChunk { delta, .. } = event {
            if self.show_chunks {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(delta.as_bytes());
                let _ = out.flush();
                self.mid_line.store(!delta.ends_with('\n'), Ordering::Relaxed);
            }
            return ControlRequest::Continue;
        }

        if let Some(line) = self.format_event(event) {
            if self.mid_line.swap(false, Ordering::Relaxed) {
                println!();
            }
            println!("{}", line);
        }
        ControlRequest::Continue
    }
}
