use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use aiwhisper_core::observer::{ControlRequest, EngineEvent, EngineObserver};
use chrono::Local;
use serde_json::{json, Value};

/// Appends one JSON object per event: `{"v": 1, "ts": ..., "event": ..., ...}`.
pub struct JsonlEventsObserver {
    writer: Mutex<Box<dyn Write + Send>>,
    include_chunks: bool,
}

impl JsonlEventsObserver {
    /// Append to `path`, creating parent directories. `stdout:` writes to
    /// standard output.
    pub fn create(path: impl AsRef<Path>, include_chunks: bool) -> io::Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == "stdout:" {
            return Ok(Self::stdout(include_chunks));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(Box::new(file), include_chunks))
    }

    pub fn stdout(include_chunks: bool) -> Self {
        Self::from_writer(Box::new(io::stdout()), include_chunks)
    }

    pub fn from_writer(writer: Box<dyn Write + Send>, include_chunks: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            include_chunks,
        }
    }

    pub fn event_to_json(event: &EngineEvent) -> Value {
        let mut line = json!({ "v": 1, "ts": Local::now().to_rfc3339() });
        if let (Value::Object(out), Ok(Value::Object(fields))) =
            (&mut line, serde_json::to_value(event))
        {
            out.extend(fields);
        }
        line
    }
}

impl EngineObserver for JsonlEventsObserver {
    fn name(&self) -> &str {
        "jsonl-events"
    }

    fn on_event(&self, event: &EngineEvent) -> ControlRequest {
        if matches!(event, EngineEvent::AiChunk { .. }) && !self.include_chunks {
            return ControlRequest::Continue;
        }
        let line = Self::event_to_json(event).to_string();
        match self.writer.lock() {
            Ok(mut w) => {
                if let Err(e) = writeln!(w, "{}", line).and_then(|_| w.flush()) {
                    tracing::warn!(error = %e, "failed to write event line");
                }
            }
            Err(_) => tracing::warn!("event writer lock poisoned"),
        }
        ControlRequest::Continue
    }
}
