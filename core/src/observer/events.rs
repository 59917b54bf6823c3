use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything an observer can see of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    EngineStarted {
        run_id: String,
        goal: String,
        total_tasks: usize,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        task_id: String,
        task_type: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        result: Value,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TaskSkipped {
        task_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Dependencies not finished yet; revisited on a later pass.
    TaskDeferred {
        task_id: String,
        waiting_on: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    AiChunk {
        task_id: String,
        delta: String,
    },
    EnginePaused {
        timestamp: DateTime<Utc>,
    },
    EngineResumed {
        timestamp: DateTime<Utc>,
    },
    EngineStopped {
        pending: usize,
        timestamp: DateTime<Utc>,
    },
    EngineFinished {
        run_id: String,
        completed: usize,
        failed: usize,
        skipped: usize,
        pending: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::EngineStarted { .. } => "engine_started",
            EngineEvent::TaskStarted { .. } => "task_started",
            EngineEvent::TaskCompleted { .. } => "task_completed",
            EngineEvent::TaskFailed { .. } => "task_failed",
            EngineEvent::TaskSkipped { .. } => "task_skipped",
            EngineEvent::TaskDeferred { .. } => "task_deferred",
            EngineEvent::AiChunk { .. } => "ai_chunk",
            EngineEvent::EnginePaused { .. } => "engine_paused",
            EngineEvent::EngineResumed { .. } => "engine_resumed",
            EngineEvent::EngineStopped { .. } => "engine_stopped",
            EngineEvent::EngineFinished { .. } => "engine_finished",
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            EngineEvent::TaskStarted { task_id, .. }
            | EngineEvent::TaskCompleted { task_id, .. }
            | EngineEvent::TaskFailed { task_id, .. }
            | EngineEvent::TaskSkipped { task_id, .. }
            | EngineEvent::TaskDeferred { task_id, .. }
            | EngineEvent::AiChunk { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_event_tag() {
        let event = EngineEvent::TaskSkipped {
            task_id: "t2".into(),
            reason: "dependency t1 failed".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "task_skipped");
        assert_eq!(value["task_id"], "t2");
        assert_eq!(event.kind(), "task_skipped");
        assert_eq!(event.task_id(), Some("t2"));
    }
}
