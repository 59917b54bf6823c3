//! State snapshot persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lock::SnapshotLock;
use super::types::TaskState;
use crate::error::StateError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of the whole execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// task_id -> {status, result, error}
    pub tasks: BTreeMap<String, TaskState>,
    #[serde(default)]
    pub global_state: Map<String, Value>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl StateSnapshot {
    pub fn new(tasks: BTreeMap<String, TaskState>, global_state: Map<String, Value>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            tasks,
            global_state,
        }
    }

    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StateError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Write atomically: serialize into a temp file next to `path`, fsync, then
    /// rename over the target while holding the snapshot lock.
    pub fn save_to_file(&self, path: &Path, lock_timeout: Duration) -> Result<(), StateError> {
        let json = self.to_json()?;
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => std::env::current_dir().map_err(|e| StateError::io(path, e))?,
        };
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        let _lock = SnapshotLock::acquire(path, lock_timeout)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StateError::io(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| StateError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StateError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| StateError::io(path, e.error))?;

        tracing::debug!(path = %path.display(), tasks = self.tasks.len(), "snapshot written");
        Ok(())
    }

    pub fn load_from_file(path: &Path, lock_timeout: Duration) -> Result<Self, StateError> {
        let _lock = SnapshotLock::acquire(path, lock_timeout)?;
        let json = fs::read_to_string(path).map_err(|e| StateError::io(path, e))?;
        Self::from_json(&json)
    }
}
