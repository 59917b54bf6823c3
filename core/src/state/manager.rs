//! State manager

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::snapshot::StateSnapshot;
use super::transitions::StateTransition;
use super::types::{StateEvent, TaskState, TaskStatus};
use crate::error::StateError;
use crate::plan::Plan;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of every task's execution state. Cloning yields another handle to
/// the same state.
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<StateManagerInner>,
}

struct StateManagerInner {
    tasks: RwLock<BTreeMap<String, TaskState>>,
    global: RwLock<Map<String, Value>>,
    event_tx: broadcast::Sender<StateEvent>,
    lock_timeout: Duration,
}

/// Per-status task counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.skipped
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(1000);

        Self {
            inner: Arc::new(StateManagerInner {
                tasks: RwLock::new(BTreeMap::new()),
                global: RwLock::new(Map::new()),
                event_tx,
                lock_timeout,
            }),
        }
    }

    /// A manager with every task of `plan` seeded as pending.
    pub async fn for_plan(plan: &Plan) -> Self {
        let manager = Self::new();
        manager.register_plan(plan).await;
        manager
    }

    /// Register every task of `plan` as pending. Tasks that already have a
    /// state (e.g. loaded from a snapshot) are left untouched.
    pub async fn register_plan(&self, plan: &Plan) {
        let mut tasks = self.inner.tasks.write().await;
        for task in plan.tasks() {
            tasks.entry(task.id.clone()).or_insert_with(TaskState::pending);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit_event(&self, event: StateEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    /// Move a task to `status`, recording `result` and `error`.
    ///
    /// Re-applying the current status is a no-op apart from filling in a
    /// provided result/error. Moving a `completed`/`failed` task back to
    /// `pending`/`in_progress` fails with `InvalidTransition`; use
    /// [`reset_task`](Self::reset_task) for an explicit retry.
    pub async fn set_task_state(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StateError> {
        let from = {
            let mut tasks = self.inner.tasks.write().await;
            let entry = tasks
                .entry(task_id.to_string())
                .or_insert_with(TaskState::pending);
            let from = entry.status;

            if !StateTransition::is_valid(from, status) {
                return Err(StateError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from,
                    to: status,
                });
            }

            if from == status {
                if result.is_some() {
                    entry.result = result;
                }
                if error.is_some() {
                    entry.error = error;
                }
                return Ok(());
            }

            entry.status = status;
            entry.result = result;
            entry.error = error;
            from
        };

        tracing::debug!(task_id = %task_id, from = %from, to = %status, "task state changed");
        self.emit_event(StateEvent::TaskStateChanged {
            task_id: task_id.to_string(),
            from,
            to: status,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Explicit retry: put a task back to `pending` and clear its outcome.
    pub async fn reset_task(&self, task_id: &str) -> Result<(), StateError> {
        let from = {
            let mut tasks = self.inner.tasks.write().await;
            let entry = tasks
                .get_mut(task_id)
                .ok_or_else(|| StateError::UnknownTask(task_id.to_string()))?;
            let from = entry.status;
            *entry = TaskState::pending();
            from
        };

        self.emit_event(StateEvent::TaskReset {
            task_id: task_id.to_string(),
            from,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Reset tasks left `in_progress` by an interrupted run. Returns the ids.
    pub async fn recover_interrupted(&self) -> Vec<String> {
        self.reset_where(|s| s == TaskStatus::InProgress).await
    }

    /// Reset `failed` and `skipped` tasks so a follow-up run retries them.
    pub async fn reset_failed(&self) -> Vec<String> {
        self.reset_where(|s| matches!(s, TaskStatus::Failed | TaskStatus::Skipped))
            .await
    }

    async fn reset_where<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(TaskStatus) -> bool,
    {
        let ids: Vec<String> = {
            let tasks = self.inner.tasks.read().await;
            tasks
                .iter()
                .filter(|(_, state)| predicate(state.status))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &ids {
            // ids were read from the map just above
            let _ = self.reset_task(id).await;
        }
        ids
    }

    pub async fn get_task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .map(|s| s.status)
    }

    /// Stored result of a task, only once it has completed.
    pub async fn get_task_result(&self, task_id: &str) -> Option<Value> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .filter(|s| s.status == TaskStatus::Completed)
            .and_then(|s| s.result.clone())
    }

    pub async fn get_task_state(&self, task_id: &str) -> Option<TaskState> {
        self.inner.tasks.read().await.get(task_id).cloned()
    }

    pub async fn task_states(&self) -> BTreeMap<String, TaskState> {
        self.inner.tasks.read().await.clone()
    }

    pub async fn summary(&self) -> StatusCounts {
        let tasks = self.inner.tasks.read().await;
        let mut counts = StatusCounts::default();
        for state in tasks.values() {
            match state.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub async fn set_global(&self, key: &str, value: Value) {
        self.inner
            .global
            .write()
            .await
            .insert(key.to_string(), value);
    }

    pub async fn get_global(&self, key: &str) -> Option<Value> {
        self.inner.global.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let tasks = self.inner.tasks.read().await.clone();
        let global = self.inner.global.read().await.clone();
        StateSnapshot::new(tasks, global)
    }

    /// Persist the current state atomically under an exclusive file lock.
    pub async fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), StateError> {
        let snapshot = self.snapshot().await;
        let path: PathBuf = path.as_ref().to_path_buf();
        let lock_timeout = self.inner.lock_timeout;

        let target = path.clone();
        tokio::task::spawn_blocking(move || snapshot.save_to_file(&target, lock_timeout))
            .await
            .map_err(|e| StateError::io(&path, std::io::Error::other(e.to_string())))??;

        self.emit_event(StateEvent::SnapshotSaved {
            path: path.display().to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Replace the in-memory state with the contents of a snapshot file.
    pub async fn load_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), StateError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let lock_timeout = self.inner.lock_timeout;

        let source = path.clone();
        let snapshot =
            tokio::task::spawn_blocking(move || StateSnapshot::load_from_file(&source, lock_timeout))
                .await
                .map_err(|e| StateError::io(&path, std::io::Error::other(e.to_string())))??;

        let task_count = snapshot.tasks.len();
        *self.inner.tasks.write().await = snapshot.tasks;
        *self.inner.global.write().await = snapshot.global_state;

        tracing::info!(path = %path.display(), tasks = task_count, "state restored from snapshot");
        self.emit_event(StateEvent::SnapshotLoaded {
            path: path.display().to_string(),
            task_count,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_task_lifecycle() {
        let manager = StateManager::new();

        manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        assert_eq!(
            manager.get_task_status("t1").await,
            Some(TaskStatus::InProgress)
        );
        assert_eq!(manager.get_task_result("t1").await, None);

        manager
            .set_task_state(
                "t1",
                TaskStatus::Completed,
                Some(json!({"prompt": "p", "response": "r"})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            manager.get_task_result("t1").await,
            Some(json!({"prompt": "p", "response": "r"}))
        );
    }

    #[tokio::test]
    async fn test_same_status_is_idempotent() {
        let manager = StateManager::new();
        manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .set_task_state("t1", TaskStatus::Failed, None, Some("x".into()))
            .await
            .unwrap();
        manager
            .set_task_state("t1", TaskStatus::Failed, None, None)
            .await
            .unwrap();
        let state = manager.get_task_state("t1").await.unwrap();
        assert_eq!(state.error.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_completed_task_cannot_restart() {
        let manager = StateManager::new();
        manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .set_task_state("t1", TaskStatus::Completed, None, None)
            .await
            .unwrap();

        let err = manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        let err = manager
            .set_task_state("t1", TaskStatus::Pending, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));

        manager.reset_task("t1").await.unwrap();
        assert_eq!(manager.get_task_status("t1").await, Some(TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_on_fresh_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let manager = StateManager::new();
        manager
            .set_task_state("a", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .set_task_state(
                "a",
                TaskStatus::Completed,
                Some(json!({"prompt": "hi", "response": "hello"})),
                None,
            )
            .await
            .unwrap();
        manager
            .set_task_state("b", TaskStatus::Skipped, None, Some("dep failed".into()))
            .await
            .unwrap();
        manager.set_global("run_id", json!("r-1")).await;
        manager.save_snapshot(&path).await.unwrap();

        let fresh = StateManager::new();
        fresh.load_snapshot(&path).await.unwrap();
        assert_eq!(fresh.task_states().await, manager.task_states().await);
        assert_eq!(fresh.get_global("run_id").await, Some(json!("r-1")));
    }

    #[tokio::test]
    async fn test_recover_interrupted_and_reset_failed() {
        let manager = StateManager::new();
        manager
            .set_task_state("running", TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .set_task_state("failed", TaskStatus::Failed, None, Some("e".into()))
            .await
            .unwrap();
        manager
            .set_task_state("skipped", TaskStatus::Skipped, None, None)
            .await
            .unwrap();

        assert_eq!(manager.recover_interrupted().await, vec!["running".to_string()]);
        assert_eq!(
            manager.reset_failed().await,
            vec!["failed".to_string(), "skipped".to_string()]
        );
        assert_eq!(manager.summary().await.pending, 3);
    }

    #[tokio::test]
    async fn test_event_subscription() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager
            .set_task_state("t1", TaskStatus::InProgress, None, None)
            .await
            .unwrap();

        match rx.recv().await {
            Ok(StateEvent::TaskStateChanged { task_id, from, to, .. }) => {
                assert_eq!(task_id, "t1");
                assert_eq!(from, TaskStatus::Pending);
                assert_eq!(to, TaskStatus::InProgress);
            }
            other => panic!("Expected TaskStateChanged event, got {:?}", other),
        }
    }
}
