//! Filesystem and process side effects behind a swappable trait.
//!
//! Every path handed to a [`ToolExecutor`] has already been resolved against
//! the working root; the executor performs no confinement of its own.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskloopError};
use crate::util::text::clip_output;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_OUTPUT_BYTES: usize = 32_768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One entry returned by `list_directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

impl DirEntry {
    fn render(&self) -> String {
        match self.kind {
            EntryKind::Directory => format!("{}/", self.name),
            _ => format!("{} ({} bytes)", self.name, self.size),
        }
    }
}

/// Render a listing the way the model sees it.
pub fn render_listing(entries: &[DirEntry]) -> String {
    if entries.is_empty() {
        return "(empty directory)".to_string();
    }
    entries.iter().map(DirEntry::render).collect::<Vec<_>>().join("\n")
}

/// Captured output of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, clipped to the output cap.
    pub output: String,
}

/// Side-effecting operations used by the tool mediator and batch executor.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Write `content`, creating parent directories as needed.
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Replace the first occurrence of `search`. Fails when it is absent.
    async fn edit_file(&self, path: &Path, search: &str, replace: &str) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Entries sorted by name.
    async fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Run `command` through the shell with `cwd` as working directory.
    /// A non-zero exit status is an error.
    async fn execute_command(&self, cwd: &Path, command: &str) -> Result<CommandOutput>;
}

/// Apply an edit to in-memory content.
pub fn apply_edit(content: &str, search: &str, replace: &str) -> Result<String> {
    if search.is_empty() {
        return Err(TaskloopError::tool("editFile", "search text must not be empty"));
    }
    if !content.contains(search) {
        return Err(TaskloopError::tool("editFile", "search text not found in file"));
    }
    Ok(content.replacen(search, replace, 1))
}

/// Executor backed by the local filesystem and `sh -c`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    command_timeout: Duration,
    max_output_bytes: usize,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl LocalExecutor {
    pub fn new(command_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            command_timeout,
            max_output_bytes,
        }
    }
}

fn io_error(tool: &str, path: &Path, err: std::io::Error) -> TaskloopError {
    TaskloopError::tool(tool, format!("{}: {err}", path.display()))
}

#[async_trait]
impl ToolExecutor for LocalExecutor {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error("readFile", path, e))?;
        Ok(clip_output(content, self.max_output_bytes))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("writeFile", parent, e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| io_error("writeFile", path, e))
    }

    async fn edit_file(&self, path: &Path, search: &str, replace: &str) -> Result<()> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error("editFile", path, e))?;
        let updated = apply_edit(&content, search, replace)?;
        tokio::fs::write(path, updated)
            .await
            .map_err(|e| io_error("editFile", path, e))
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_error("deleteFile", path, e))
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| io_error("listDirectory", path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| io_error("listDirectory", path, e))?
        {
            let metadata = entry.metadata().await.ok();
            let kind = match &metadata {
                Some(m) if m.is_dir() => EntryKind::Directory,
                Some(m) if m.is_file() => EntryKind::File,
                _ => EntryKind::Other,
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: metadata.map(|m| m.len()).unwrap_or(0),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn execute_command(&self, cwd: &Path, command: &str) -> Result<CommandOutput> {
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.command_timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(TaskloopError::tool("runCommand", e.to_string())),
            Err(_) => {
                return Err(TaskloopError::tool(
                    "runCommand",
                    format!("command timed out after {}s", self.command_timeout.as_secs()),
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = clip_output(format!("{stdout}{stderr}"), self.max_output_bytes);

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(TaskloopError::tool(
                "runCommand",
                format!("command exited with status {code}: {combined}"),
            ));
        }

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}
