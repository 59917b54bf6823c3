use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::traits::Workspace;
use crate::error::TaskError;

/// Artifacts stored under a root directory. Absolute paths and `..`
/// components are rejected.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, TaskError> {
        let rel = Path::new(path);
        if path.trim().is_empty() {
            return Err(TaskError::artifact(path, "empty artifact path"));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(TaskError::artifact(path, "path escapes the workspace"))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(TaskError::artifact(path, "absolute paths are not allowed"))
                }
            }
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read_artifact(&self, path: &str) -> Result<String, TaskError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| TaskError::artifact(path, e))
    }

    async fn write_artifact(&self, path: &str, content: &str) -> Result<(), TaskError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::artifact(path, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| TaskError::artifact(path, e))?;
        tracing::debug!(artifact = %path, bytes = content.len(), "artifact written");
        Ok(())
    }

    async fn artifact_exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}
