//! `FileToolkit` (§4.5, §8): the one concrete toolkit this engine ships, since the third-party
//! toolkit library itself is out of scope (§1) and everything else the run loop needs is the
//! `Tool` contract those toolkits would implement. Grounded in the upstream module's
//! `write_file`/`read` tools, reworked onto [`super::contract::Tool`] and confined to a
//! project's workdir via [`cowork_workdir::WorkdirResolver`] instead of trusting a raw path.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use cowork_workdir::WorkdirResolver;

use super::context::ToolContext;
use super::contract::{Tool, ToolError, ToolSpec};

const TOOLKIT_NAME: &str = "file";

/// Joins `relative` onto the project's workdir and rejects anything that escapes it, so a path
/// like `../../etc/passwd` can never reach outside the sandbox (§5 disk layout).
fn resolve_under_project(resolver: &WorkdirResolver, project_id: &str, relative: &str) -> Result<PathBuf, ToolError> {
    let root = resolver.project_dir(project_id);
    let candidate = root.join(relative.trim_start_matches('/'));
    let normalized = normalize_lexically(&candidate);
    if !normalized.starts_with(&root) {
        return Err(ToolError::Failed(format!("path escapes project workdir: {relative}")));
    }
    Ok(normalized)
}

/// Lexical `..`/`.` resolution that doesn't require the path to exist yet (unlike
/// `Path::canonicalize`, which a not-yet-written file would fail).
fn normalize_lexically(path: &std::path::Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub struct WriteToFile {
    resolver: WorkdirResolver,
}

impl WriteToFile {
    pub fn new(resolver: WorkdirResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for WriteToFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            toolkit_name: TOOLKIT_NAME.to_string(),
            method_name: "write_to_file".to_string(),
            description: "Write text content to a file under the project's workdir, creating \
                          parent directories as needed."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path relative to the project workdir." },
                    "content": { "type": "string", "description": "Text content to write." },
                    "append": { "type": "boolean", "default": false }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Failed("missing path".to_string()))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Failed("missing content".to_string()))?;
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);

        let resolved = resolve_under_project(&self.resolver, &ctx.project_id, path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ToolError::Failed(e.to_string()))?;
        }
        if append {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .map_err(|e| ToolError::Failed(e.to_string()))?;
            file.write_all(content.as_bytes()).map_err(|e| ToolError::Failed(e.to_string()))?;
        } else {
            std::fs::write(&resolved, content).map_err(|e| ToolError::Failed(e.to_string()))?;
        }

        Ok(format!("written to file: {}", resolved.display()))
    }
}

pub struct ReadFromFile {
    resolver: WorkdirResolver,
}

impl ReadFromFile {
    pub fn new(resolver: WorkdirResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for ReadFromFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            toolkit_name: TOOLKIT_NAME.to_string(),
            method_name: "read_file".to_string(),
            description: "Read the text content of a file under the project's workdir.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path relative to the project workdir." }
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Failed("missing path".to_string()))?;
        let resolved = resolve_under_project(&self.resolver, &ctx.project_id, path)?;
        std::fs::read_to_string(&resolved).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(project_id: &str) -> ToolContext {
        ToolContext::new("document_agent", "task-1", project_id, None)
    }

    #[tokio::test]
    async fn write_then_read_round_trips_under_project_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = WorkdirResolver::new(tmp.path());
        let write = WriteToFile::new(resolver.clone());
        let read = ReadFromFile::new(resolver.clone());

        let out = write
            .call(json!({"path": "report.xlsx", "content": "sheet data"}), &ctx("proj-1"))
            .await
            .unwrap();
        assert!(out.contains("report.xlsx"));

        let content = read.call(json!({"path": "report.xlsx"}), &ctx("proj-1")).await.unwrap();
        assert_eq!(content, "sheet data");
    }

    #[tokio::test]
    async fn append_true_appends_instead_of_overwriting() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = WorkdirResolver::new(tmp.path());
        let write = WriteToFile::new(resolver.clone());

        write.call(json!({"path": "log.txt", "content": "a"}), &ctx("proj-1")).await.unwrap();
        write
            .call(json!({"path": "log.txt", "content": "b", "append": true}), &ctx("proj-1"))
            .await
            .unwrap();

        let read = ReadFromFile::new(resolver);
        let content = read.call(json!({"path": "log.txt"}), &ctx("proj-1")).await.unwrap();
        assert_eq!(content, "ab");
    }

    #[tokio::test]
    async fn rejects_paths_that_escape_the_project_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = WorkdirResolver::new(tmp.path());
        let write = WriteToFile::new(resolver);

        let err = write
            .call(json!({"path": "../../etc/passwd", "content": "x"}), &ctx("proj-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
