//! Running a validated invocation against the executor.
//!
//! Shared by immediate dispatch in the model loop and by batch execution of
//! approved actions. Paths are resolved against the working root on every
//! call.

use std::path::Path;

use crate::error::{Result, TaskloopError};
use crate::sandbox::path::{display_relative, resolve};
use crate::sandbox::LimitsTracker;
use crate::tools::catalog::{EditArgs, ToolInvocation};
use crate::tools::{render_listing, ToolExecutor};

/// Size a write or edit would leave on disk, when it can be known up front.
pub(crate) async fn projected_size(root: &Path, invocation: &ToolInvocation) -> Result<Option<u64>> {
    match invocation {
        ToolInvocation::WriteFile(args) => Ok(Some(args.content.len() as u64)),
        ToolInvocation::EditFile(EditArgs {
            path,
            search,
            replace,
        }) => {
            let target = resolve(root, path)?;
            let Ok(metadata) = tokio::fs::metadata(&target).await else {
                return Ok(None);
            };
            let size = metadata
                .len()
                .saturating_sub(search.len() as u64)
                .saturating_add(replace.len() as u64);
            Ok(Some(size))
        }
        _ => Ok(None),
    }
}

/// Perform the side effect of `invocation` and describe the outcome.
///
/// `completeTask` and `askQuestion` have no executor counterpart and are
/// rejected here.
pub(crate) async fn run(
    executor: &dyn ToolExecutor,
    root: &Path,
    invocation: &ToolInvocation,
    tracker: &LimitsTracker,
) -> Result<String> {
    if let Some(size) = projected_size(root, invocation).await? {
        tracker.validate_file_size(size)?;
    }

    match invocation {
        ToolInvocation::ReadFile(args) => {
            let path = resolve(root, &args.path)?;
            executor.read_file(&path).await
        }
        ToolInvocation::ListDirectory(args) => {
            let path = resolve(root, &args.path)?;
            let entries = executor.list_directory(&path).await?;
            Ok(render_listing(&entries))
        }
        ToolInvocation::WriteFile(args) => {
            let path = resolve(root, &args.path)?;
            executor.write_file(&path, &args.content).await?;
            Ok(format!(
                "Wrote {} bytes to {}",
                args.content.len(),
                display_relative(root, &path)
            ))
        }
        ToolInvocation::EditFile(args) => {
            let path = resolve(root, &args.path)?;
            executor.edit_file(&path, &args.search, &args.replace).await?;
            Ok(format!("Edited {}", display_relative(root, &path)))
        }
        ToolInvocation::DeleteFile(args) => {
            let path = resolve(root, &args.path)?;
            executor.delete_file(&path).await?;
            Ok(format!("Deleted {}", display_relative(root, &path)))
        }
        ToolInvocation::RunCommand(args) => {
            let cwd = resolve(root, ".")?;
            let output = executor.execute_command(&cwd, &args.command).await?;
            if output.output.trim().is_empty() {
                Ok("(command produced no output)".to_string())
            } else {
                Ok(output.output)
            }
        }
        ToolInvocation::CompleteTask(_) | ToolInvocation::AskQuestion(_) => {
            Err(TaskloopError::InvalidState(format!(
                "{} is not dispatched to the executor",
                invocation.tool_name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxLimits;
    use crate::tools::catalog::{PathArgs, WriteArgs};
    use crate::tools::LocalExecutor;

    fn write(path: &str, content: &str) -> ToolInvocation {
        ToolInvocation::WriteFile(WriteArgs {
            path: path.into(),
            content: content.into(),
        })
    }

    #[tokio::test]
    async fn write_then_read_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LimitsTracker::new(SandboxLimits::default());
        let executor = LocalExecutor::default();

        let out = run(&executor, dir.path(), &write("src/a.txt", "abc"), &tracker)
            .await
            .unwrap();
        assert_eq!(out, "Wrote 3 bytes to src/a.txt");

        let read = ToolInvocation::ReadFile(PathArgs {
            path: "src/a.txt".into(),
        });
        assert_eq!(run(&executor, dir.path(), &read, &tracker).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn oversized_write_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let limits = SandboxLimits {
            max_file_size_bytes: 4,
            ..SandboxLimits::unlimited()
        };
        let tracker = LimitsTracker::new(limits);

        let err = run(&LocalExecutor::default(), dir.path(), &write("big.txt", "12345"), &tracker)
            .await
            .unwrap_err();
        assert!(err.limit_exceeded().is_some());
        assert!(!dir.path().join("big.txt").exists());
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_the_executor_runs() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LimitsTracker::new(SandboxLimits::default());
        let err = run(
            &LocalExecutor::default(),
            &dir.path().join("work"),
            &write("../escape.txt", "x"),
            &tracker,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskloopError::PathTraversal { .. }));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_through_symlinked_directory_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), work.path().join("link")).unwrap();
        let tracker = LimitsTracker::new(SandboxLimits::default());

        let err = run(
            &LocalExecutor::default(),
            work.path(),
            &write("link/created.txt", "x"),
            &tracker,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskloopError::PathTraversal { .. }));
        assert!(!outside.path().join("created.txt").exists());
    }
}
