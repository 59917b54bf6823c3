use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use uuid::Uuid;

use super::resolver::{DependencyResolver, Resolution};
use super::types::RunSummary;
use crate::ai::ChatCompletion;
use crate::dispatch::{AiSettings, HandlerContext, LocalWorkspace, NoTools, TaskDispatcher, ToolInvoker, Workspace};
use crate::error::{EngineError, TaskError};
use crate::history::ConversationHistoryAssembler;
use crate::observer::{EngineControl, EngineEvent, EngineObserver, EngineState, ObserverRegistry};
use crate::plan::{Plan, Task};
use crate::state::{StateManager, TaskStatus};

/// Runs a validated plan one task at a time, in stable topological order.
///
/// A task failure never aborts the run: dependents are skipped
/// transitively and every other schedulable task still runs. Pause and
/// stop requests (from an [`EngineControl`] handle or an observer) are
/// honoured before each dispatch; an in-flight task always finishes.
pub struct ExecutionEngine {
    plan: Arc<Plan>,
    dispatcher: TaskDispatcher,
    state: StateManager,
    ai: Option<Arc<dyn ChatCompletion>>,
    ai_settings: AiSettings,
    workspace: Arc<dyn Workspace>,
    tools: Arc<dyn ToolInvoker>,
    observers: Arc<ObserverRegistry>,
    control: EngineControl,
    resolver: DependencyResolver,
    snapshot_path: Option<PathBuf>,
    checkpoint: bool,
    running: AtomicBool,
}

pub struct ExecutionEngineBuilder {
    plan: Arc<Plan>,
    dispatcher: TaskDispatcher,
    state: Option<StateManager>,
    ai: Option<Arc<dyn ChatCompletion>>,
    ai_settings: AiSettings,
    workspace: Option<Arc<dyn Workspace>>,
    tools: Option<Arc<dyn ToolInvoker>>,
    observers: Vec<Arc<dyn EngineObserver>>,
    control: Option<EngineControl>,
    snapshot_path: Option<PathBuf>,
    checkpoint: bool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Gate {
    Proceed,
    Stop,
}

impl ExecutionEngine {
    pub fn builder(plan: impl Into<Arc<Plan>>, dispatcher: TaskDispatcher) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(plan.into(), dispatcher)
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Handle for pausing, resuming or stopping this engine from elsewhere.
    pub fn control(&self) -> EngineControl {
        self.control.clone()
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Execute the plan until every task is settled or a stop is requested.
    pub async fn run(&self) -> Result<RunSummary, EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        self.state.register_plan(&self.plan).await;
        let recovered = self.state.recover_interrupted().await;
        if !recovered.is_empty() {
            tracing::warn!(tasks = ?recovered, "tasks left in progress by an interrupted run were reset");
        }
        self.state.set_global("run_id", json!(run_id)).await;
        self.state
            .set_global("natural_language_goal", json!(self.plan.goal()))
            .await;
        self.control.rearm();

        tracing::info!(run_id = %run_id, tasks = self.plan.len(), "execution started");
        self.emit(EngineEvent::EngineStarted {
            run_id: run_id.clone(),
            goal: self.plan.goal().to_string(),
            total_tasks: self.plan.len(),
            timestamp: Utc::now(),
        });

        let ctx = HandlerContext {
            run_id: run_id.clone(),
            plan: self.plan.clone(),
            state: self.state.clone(),
            ai: self.ai.clone(),
            ai_settings: self.ai_settings.clone(),
            history: ConversationHistoryAssembler::new(),
            workspace: self.workspace.clone(),
            tools: self.tools.clone(),
            observers: self.observers.clone(),
        };

        let stopped = self.run_passes(&ctx).await?;

        let end_state = if stopped {
            EngineState::Stopped
        } else {
            self.control.finish();
            EngineState::Finished
        };
        self.state
            .set_global("last_run_state", json!(end_state.as_str()))
            .await;

        let summary = self.summarize(run_id, end_state, started).await;
        if let Some(path) = &self.snapshot_path {
            self.state.save_snapshot(path).await?;
        }

        match end_state {
            EngineState::Stopped => {
                tracing::info!(run_id = %summary.run_id, pending = summary.pending, "execution stopped");
                self.emit(EngineEvent::EngineStopped {
                    pending: summary.pending,
                    timestamp: Utc::now(),
                });
            }
            _ => {
                tracing::info!(
                    run_id = %summary.run_id,
                    completed = summary.completed,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "execution finished"
                );
                self.emit(EngineEvent::EngineFinished {
                    run_id: summary.run_id.clone(),
                    completed: summary.completed,
                    failed: summary.failed,
                    skipped: summary.skipped,
                    pending: summary.pending,
                    duration_ms: summary.duration.as_millis() as u64,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(summary)
    }

    /// Multi-pass scheduling loop. Returns true when stopped early.
    async fn run_passes(&self, ctx: &HandlerContext) -> Result<bool, EngineError> {
        let mut remaining: Vec<&Task> = Vec::new();
        for id in self.plan.visit_order() {
            let pending = matches!(
                self.state.get_task_status(id).await,
                Some(TaskStatus::Pending) | None
            );
            if let (true, Some(task)) = (pending, self.plan.task(id)) {
                remaining.push(task);
            }
        }

        let mut announced: HashSet<&str> = HashSet::new();
        let mut pass = 0usize;

        while !remaining.is_empty() {
            pass += 1;
            let mut deferred = Vec::new();
            let mut progressed = false;

            for task in remaining {
                match self.resolver.resolve(task, &self.state).await {
                    Resolution::Skip { dependency, status } => {
                        self.skip_task(task, &dependency, status).await?;
                        progressed = true;
                    }
                    Resolution::Blocked { waiting_on } => {
                        if announced.insert(task.id.as_str()) {
                            tracing::warn!(task_id = %task.id, waiting_on = ?waiting_on, pass, "task deferred");
                            self.emit(EngineEvent::TaskDeferred {
                                task_id: task.id.clone(),
                                waiting_on,
                                timestamp: Utc::now(),
                            });
                        }
                        deferred.push(task);
                    }
                    Resolution::Ready => {
                        if let Gate::Stop = self.gate().await {
                            return Ok(true);
                        }
                        self.execute_task(task, ctx).await?;
                        progressed = true;
                    }
                }
            }

            if !progressed && !deferred.is_empty() {
                let ids: Vec<&str> = deferred.iter().map(|t| t.id.as_str()).collect();
                tracing::warn!(tasks = ?ids, pass, "no schedulable task left; ending run");
                break;
            }
            remaining = deferred;
        }

        Ok(false)
    }

    /// The only cooperative yield point: blocks while paused.
    async fn gate(&self) -> Gate {
        match self.control.state() {
            EngineState::Stopped => Gate::Stop,
            EngineState::Paused => {
                tracing::info!("execution paused");
                self.emit(EngineEvent::EnginePaused {
                    timestamp: Utc::now(),
                });
                match self.control.wait_while_paused().await {
                    EngineState::Stopped => Gate::Stop,
                    _ => {
                        tracing::info!("execution resumed");
                        self.emit(EngineEvent::EngineResumed {
                            timestamp: Utc::now(),
                        });
                        Gate::Proceed
                    }
                }
            }
            EngineState::Running | EngineState::Finished => Gate::Proceed,
        }
    }

    async fn skip_task(
        &self,
        task: &Task,
        dependency: &str,
        status: TaskStatus,
    ) -> Result<(), EngineError> {
        let reason = format!("dependency '{dependency}' {status}");
        tracing::debug!(task_id = %task.id, reason = %reason, "task skipped");
        self.state
            .set_task_state(&task.id, TaskStatus::Skipped, None, Some(reason.clone()))
            .await?;
        self.emit(EngineEvent::TaskSkipped {
            task_id: task.id.clone(),
            reason,
            timestamp: Utc::now(),
        });
        self.checkpoint().await;
        Ok(())
    }

    async fn execute_task(&self, task: &Task, ctx: &HandlerContext) -> Result<(), EngineError> {
        self.state
            .set_task_state(&task.id, TaskStatus::InProgress, None, None)
            .await?;
        tracing::debug!(task_id = %task.id, task_type = %task.task_type(), "task started");
        self.emit(EngineEvent::TaskStarted {
            task_id: task.id.clone(),
            task_type: task.task_type().to_string(),
            timestamp: Utc::now(),
        });
        self.checkpoint().await;

        let outcome = AssertUnwindSafe(self.dispatcher.dispatch(task, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::Handler(anyhow::anyhow!(panic_message(&*panic)))));

        match outcome {
            Ok(result) => {
                self.state
                    .set_task_state(&task.id, TaskStatus::Completed, Some(result.clone()), None)
                    .await?;
                tracing::debug!(task_id = %task.id, status = "completed", "task finished");
                self.emit(EngineEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    result,
                    timestamp: Utc::now(),
                });
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(task_id = %task.id, error = %message, "task failed");
                self.state
                    .set_task_state(&task.id, TaskStatus::Failed, None, Some(message.clone()))
                    .await?;
                self.emit(EngineEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error: message,
                    timestamp: Utc::now(),
                });
            }
        }

        self.checkpoint().await;
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        self.observers.notify(&event);
    }

    /// Intermediate snapshot; failures are logged, the final snapshot is
    /// the one that must succeed.
    async fn checkpoint(&self) {
        if !self.checkpoint {
            return;
        }
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = self.state.save_snapshot(path).await {
                tracing::warn!(path = %path.display(), error = %e, "checkpoint snapshot failed");
            }
        }
    }

    async fn summarize(&self, run_id: String, state: EngineState, started: Instant) -> RunSummary {
        let mut summary = RunSummary {
            run_id,
            state,
            completed: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            statuses: Vec::with_capacity(self.plan.len()),
            duration: started.elapsed(),
        };

        for id in self.plan.visit_order() {
            let status = self
                .state
                .get_task_status(id)
                .await
                .unwrap_or(TaskStatus::Pending);
            match status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Pending | TaskStatus::InProgress => summary.pending += 1,
            }
            summary.statuses.push((id.clone(), status));
        }
        summary
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}

impl ExecutionEngineBuilder {
    pub fn new(plan: Arc<Plan>, dispatcher: TaskDispatcher) -> Self {
        Self {
            plan,
            dispatcher,
            state: None,
            ai: None,
            ai_settings: AiSettings::default(),
            workspace: None,
            tools: None,
            observers: Vec::new(),
            control: None,
            snapshot_path: None,
            checkpoint: true,
        }
    }

    /// Existing state, e.g. restored from a snapshot for a resumed run.
    pub fn state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    pub fn ai(mut self, ai: Arc<dyn ChatCompletion>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn ai_settings(mut self, settings: AiSettings) -> Self {
        self.ai_settings = settings;
        self
    }

    pub fn workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn control(mut self, control: EngineControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Snapshot after every task transition (default on). The final
    /// snapshot is always written when a path is set.
    pub fn checkpoint(mut self, enabled: bool) -> Self {
        self.checkpoint = enabled;
        self
    }

    pub fn build(self) -> ExecutionEngine {
        let control = self.control.unwrap_or_default();
        let mut registry = ObserverRegistry::new(control.clone());
        for observer in self.observers {
            registry.register(observer);
        }

        ExecutionEngine {
            plan: self.plan,
            dispatcher: self.dispatcher,
            state: self.state.unwrap_or_default(),
            ai: self.ai,
            ai_settings: self.ai_settings,
            workspace: self
                .workspace
                .unwrap_or_else(|| Arc::new(LocalWorkspace::new("."))),
            tools: self.tools.unwrap_or_else(|| Arc::new(NoTools)),
            observers: Arc::new(registry),
            control,
            resolver: DependencyResolver::new(),
            snapshot_path: self.snapshot_path,
            checkpoint: self.checkpoint,
            running: AtomicBool::new(false),
        }
    }
}
