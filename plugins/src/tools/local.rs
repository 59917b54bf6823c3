use std::path::Path;

use aiwhisper_core::dispatch::{LocalWorkspace, ToolInvoker, Workspace};
use aiwhisper_core::error::TaskError;
use async_trait::async_trait;
use serde_json::{json, Value};

const TOOLS: [&str; 4] = ["read_file", "write_file", "list_files", "file_exists"];

/// File tools scoped to a workspace root.
///
/// | tool          | args                 | result                      |
/// |---------------|----------------------|-----------------------------|
/// | `read_file`   | `path`               | `{path, content}`           |
/// | `write_file`  | `path`, `content`    | `{path, bytes}`             |
/// | `list_files`  | `pattern` (`**/*`)   | `{files: [relative paths]}` |
/// | `file_exists` | `path`               | `{path, exists}`            |
#[derive(Debug, Clone)]
pub struct LocalToolbox {
    workspace: LocalWorkspace,
}

impl LocalToolbox {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            workspace: LocalWorkspace::new(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    async fn read_file(&self, args: &Value) -> Result<Value, TaskError> {
        let path = str_arg("read_file", args, "path")?;
        let content = self
            .workspace
            .read_artifact(path)
            .await
            .map_err(|e| TaskError::tool("read_file", e))?;
        Ok(json!({ "path": path, "content": content }))
    }

    async fn write_file(&self, args: &Value) -> Result<Value, TaskError> {
        let path = str_arg("write_file", args, "path")?;
        let content = str_arg("write_file", args, "content")?;
        self.workspace
            .write_artifact(path, content)
            .await
            .map_err(|e| TaskError::tool("write_file", e))?;
        Ok(json!({ "path": path, "bytes": content.len() }))
    }

    async fn file_exists(&self, args: &Value) -> Result<Value, TaskError> {
        let path = str_arg("file_exists", args, "path")?;
        let exists = self.workspace.artifact_exists(path).await;
        Ok(json!({ "path": path, "exists": exists }))
    }

    async fn list_files(&self, args: &Value) -> Result<Value, TaskError> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .unwrap_or("**/*")
            .to_string();
        // Reuse path validation; the glob must stay inside the root.
        let base = self
            .workspace
            .resolve(&pattern)
            .map_err(|e| TaskError::tool("list_files", e))?;
        let root = self.workspace.root().to_path_buf();

        let files = tokio::task::spawn_blocking(move || -> Result<Vec<String>, TaskError> {
            let full = base.to_string_lossy().into_owned();
            let entries =
                glob::glob(&full).map_err(|e| TaskError::tool("list_files", e))?;
            let mut files: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .filter_map(|p| {
                    p.strip_prefix(&root)
                        .ok()
                        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                })
                .collect();
            files.sort();
            Ok(files)
        })
        .await
        .map_err(|e| TaskError::tool("list_files", e))??;

        Ok(json!({ "files": files }))
    }
}

fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str, TaskError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| TaskError::tool(tool, format!("missing string argument '{key}'")))
}

#[async_trait]
impl ToolInvoker for LocalToolbox {
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, TaskError> {
        tracing::debug!(tool, "invoking tool");
        match tool {
            "read_file" => self.read_file(&args).await,
            "write_file" => self.write_file(&args).await,
            "list_files" => self.list_files(&args).await,
            "file_exists" => self.file_exists(&args).await,
            other => Err(TaskError::tool(other, "unknown tool")),
        }
    }

    fn tool_names(&self) -> Vec<String> {
        TOOLS.iter().map(|t| t.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_and_exists() {
        let dir = TempDir::new().unwrap();
        let tools = LocalToolbox::new(dir.path());

        let written = tools
            .invoke("write_file", json!({"path": "a/b.txt", "content": "hey"}))
            .await
            .unwrap();
        assert_eq!(written, json!({"path": "a/b.txt", "bytes": 3}));

        let read = tools
            .invoke("read_file", json!({"path": "a/b.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "hey");

        let exists = tools
            .invoke("file_exists", json!({"path": "a/missing.txt"}))
            .await
            .unwrap();
        assert_eq!(exists["exists"], false);
    }

    #[tokio::test]
    async fn list_files_is_sorted_and_relative() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/z.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/nested/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();

        let tools = LocalToolbox::new(dir.path());
        let listed = tools
            .invoke("list_files", json!({"pattern": "src/**/*.rs"}))
            .await
            .unwrap();
        assert_eq!(listed["files"], json!(["src/nested/a.rs", "src/z.rs"]));
    }

    #[tokio::test]
    async fn rejects_escapes_and_unknown_tools() {
        let dir = TempDir::new().unwrap();
        let tools = LocalToolbox::new(dir.path());

        let err = tools
            .invoke("read_file", json!({"path": "../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Tool { .. }));

        let err = tools.invoke("rm_rf", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "tool 'rm_rf' failed: unknown tool");
        assert_eq!(tools.tool_names().len(), 4);
    }
}
