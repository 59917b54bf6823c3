#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aiwhisper_core::ai::{ChatCompletion, ChatRequest, ChatStream, StreamChunk};
use aiwhisper_core::dispatch::{HandlerContext, TaskHandler};
use aiwhisper_core::error::{AiServiceError, TaskError};
use aiwhisper_core::observer::{ControlRequest, EngineEvent, EngineObserver};
use aiwhisper_core::Plan;
use aiwhisper_core::Task;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Route engine logs to the test harness output. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("aiwhisper_core=debug")
        .with_test_writer()
        .try_init();
}

/// Build a plan from `(id, type, depends_on)` triples.
pub fn plan_of(tasks: &[(&str, &str, &[&str])]) -> Plan {
    let steps: Vec<Value> = tasks
        .iter()
        .map(|(id, ty, deps)| {
            json!({
                "step_id": id,
                "description": format!("task {id}"),
                "depends_on": deps,
                "agent_spec": {"type": ty, "instructions": format!("do {id}")}
            })
        })
        .collect();
    let doc = json!({"natural_language_goal": "test goal", "plan": steps});
    Plan::from_json_str(&doc.to_string()).expect("valid test plan")
}

type HandlerFn = dyn Fn(&Task) -> Result<Value, TaskError> + Send + Sync;

/// Handler backed by a closure; counts invocations per task.
pub struct FnHandler {
    f: Box<HandlerFn>,
    pub calls: Mutex<Vec<String>>,
}

impl FnHandler {
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: Fn(&Task) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            f: Box::new(f),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Succeeds for every task except those listed, which fail.
    pub fn failing_on(ids: &[&str]) -> Arc<Self> {
        let failing: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        Self::new(move |task| {
            if failing.contains(&task.id) {
                Err(TaskError::ValidationFailed(format!("{} exploded", task.id)))
            } else {
                Ok(json!({ "done": task.id }))
            }
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for FnHandler {
    fn name(&self) -> &str {
        "fn"
    }

    async fn handle(&self, task: &Task, _ctx: &HandlerContext) -> Result<Value, TaskError> {
        self.calls.lock().unwrap().push(task.id.clone());
        (self.f)(task)
    }
}

/// Chat provider replying from a script, then with a fixed fallback.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            fallback: "ok".to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn next_reply(&self, request: &ChatRequest) -> String {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ChatCompletion for ScriptedProvider {
    fn default_model(&self) -> &str {
        "scripted/model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, AiServiceError> {
        Ok(self.next_reply(request))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, AiServiceError> {
        let reply = self.next_reply(request);
        let mut chunks: Vec<Result<StreamChunk, AiServiceError>> = reply
            .split_inclusive(' ')
            .map(|w| Ok(StreamChunk::Delta(w.to_string())))
            .collect();
        chunks.push(Ok(StreamChunk::Done {
            finish_reason: Some("stop".into()),
        }));
        Ok(ChatStream::from_chunks(chunks))
    }
}

/// Records every event; answers `request` once it sees `trigger`
/// (event kind, optional task id).
pub struct RecordingObserver {
    pub events: Mutex<Vec<EngineEvent>>,
    trigger: Option<(&'static str, Option<String>, ControlRequest)>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            trigger: None,
        })
    }

    pub fn requesting(kind: &'static str, task_id: Option<&str>, request: ControlRequest) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            trigger: Some((kind, task_id.map(str::to_string), request)),
        })
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    pub fn saw(&self, kind: &str) -> bool {
        self.kinds().contains(&kind)
    }

    /// Poll until `kind` has been observed.
    pub async fn wait_for(&self, kind: &str) {
        for _ in 0..200 {
            if self.saw(kind) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {kind}; saw {:?}", self.kinds());
    }
}

impl EngineObserver for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &EngineEvent) -> ControlRequest {
        self.events.lock().unwrap().push(event.clone());
        match &self.trigger {
            Some((kind, task_id, request))
                if *kind == event.kind() && (task_id.is_none() || task_id.as_deref() == event.task_id()) =>
            {
                *request
            }
            _ => ControlRequest::Continue,
        }
    }
}
