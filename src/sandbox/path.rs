//! Working-root confinement for filesystem tools.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, TaskloopError};

/// Resolve `requested` against `root` and ensure the result stays inside it.
///
/// The result is either `root` itself or nested under `root` followed by a
/// separator; `/work-other` is never accepted for root `/work`. When the root
/// exists, the deepest existing ancestor of the result is also checked after
/// symlink resolution, so a file that does not exist yet cannot be created
/// through a link pointing outside. Callers resolve again on every
/// filesystem call.
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf> {
    let root = absolute_root(root)?;
    let candidate = normalize(&root.join(requested.trim()));

    if !is_within(&root, &candidate) {
        return Err(traversal(requested, &root));
    }

    if let Ok(real_root) = std::fs::canonicalize(&root) {
        if !real_path_within(&real_root, &candidate) {
            return Err(traversal(requested, &root));
        }
    }

    Ok(candidate)
}

/// Walk up from `candidate` to the first path that exists and compare its
/// real location with `real_root`. A dangling symlink on the way is rejected.
fn real_path_within(real_root: &Path, candidate: &Path) -> bool {
    for ancestor in candidate.ancestors() {
        match std::fs::canonicalize(ancestor) {
            Ok(real) => return is_within(real_root, &real),
            Err(_) if std::fs::symlink_metadata(ancestor).is_ok() => return false,
            Err(_) => {}
        }
    }
    false
}

/// Render `path` relative to `root` for tool output and action records.
pub fn display_relative(root: &Path, path: &Path) -> String {
    let root = normalize(root);
    match path.strip_prefix(&root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

fn absolute_root(root: &Path) -> Result<PathBuf> {
    if root.as_os_str().is_empty() {
        return Err(TaskloopError::Configuration(
            "working directory is not configured".to_string(),
        ));
    }
    if root.is_absolute() {
        return Ok(normalize(root));
    }
    Ok(normalize(&std::env::current_dir()?.join(root)))
}

fn is_within(root: &Path, candidate: &Path) -> bool {
    // `Path::starts_with` compares whole components.
    candidate == root || candidate.starts_with(root)
}

fn traversal(requested: &str, root: &Path) -> TaskloopError {
    TaskloopError::PathTraversal {
        requested: requested.to_string(),
        root: root.to_path_buf(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
