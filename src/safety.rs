//! Path safety for files named by a patch.
//!
//! Patch text is model output and therefore untrusted: paths are sanitized
//! before any file-system use (no absolute paths, no `..` traversal), then
//! resolved and checked against the workspace boundary and a small set of
//! forbidden directories.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("patch path is absolute: {0}")]
    AbsolutePath(String),

    #[error("patch path contains parent traversal: {0}")]
    ParentTraversal(String),

    #[error("patch path is empty")]
    EmptyPath,

    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

/// Reject patch paths that could escape the workspace before they are ever
/// joined to it. Returns the path unchanged on success.
pub fn sanitize_patch_path(path: &str) -> Result<&Path, SafetyError> {
    if path.is_empty() {
        return Err(SafetyError::EmptyPath);
    }

    let p = Path::new(path);
    if p.is_absolute() {
        return Err(SafetyError::AbsolutePath(path.to_string()));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SafetyError::ParentTraversal(path.to_string()));
    }

    Ok(p)
}

/// Workspace boundary enforcement for resolved paths.
///
/// The workspace root is canonicalized so symlink tricks cannot smuggle a
/// write outside it.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    workspace_root: PathBuf,
    forbidden_paths: Vec<PathBuf>,
}

impl WorkspaceGuard {
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();

        // Toolchain and registry trees must never be patch targets even
        // when a workspace is nested under them.
        if let Some(home) = home::home_dir() {
            for dir in [".cargo/registry", ".cargo/git", ".rustup"] {
                if let Ok(p) = home.join(dir).canonicalize() {
                    forbidden_paths.push(p);
                }
            }
        }

        // Version-control metadata and build output inside the workspace.
        for dir in [".git", "target"] {
            if let Ok(p) = workspace_root.join(dir).canonicalize() {
                forbidden_paths.push(p);
            }
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Sanitize a patch-relative path and resolve it within the workspace.
    ///
    /// Returns the canonicalized absolute path if the file exists and is
    /// safe to touch.
    pub fn resolve_patch_path(&self, path: &str) -> Result<PathBuf, SafetyError> {
        let relative = sanitize_patch_path(path)?;
        let canonical = self.workspace_root.join(relative).canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sanitize_accepts_plain_relative_path() {
        assert!(sanitize_patch_path("src/lib.rs").is_ok());
        assert!(sanitize_patch_path("deep/nested/dir/file.txt").is_ok());
    }

    #[test]
    fn test_sanitize_rejects_absolute_path() {
        assert!(matches!(
            sanitize_patch_path("/etc/passwd"),
            Err(SafetyError::AbsolutePath(_))
        ));
    }

    #[test]
    fn test_sanitize_rejects_parent_traversal() {
        assert!(matches!(
            sanitize_patch_path("../outside.rs"),
            Err(SafetyError::ParentTraversal(_))
        ));
        assert!(matches!(
            sanitize_patch_path("src/../../outside.rs"),
            Err(SafetyError::ParentTraversal(_))
        ));
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(matches!(sanitize_patch_path(""), Err(SafetyError::EmptyPath)));
    }

    #[test]
    fn test_resolve_inside_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        fs::create_dir_all(workspace.join("src")).unwrap();
        fs::write(workspace.join("src/main.rs"), b"").unwrap();

        let guard = WorkspaceGuard::new(workspace).unwrap();
        assert!(guard.resolve_patch_path("src/main.rs").is_ok());
    }

    #[test]
    fn test_resolve_missing_file_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path()).unwrap();
        assert!(matches!(
            guard.resolve_patch_path("no_such_file.rs"),
            Err(SafetyError::Canonicalize(_))
        ));
    }

    #[test]
    fn test_resolve_forbidden_git_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        fs::create_dir_all(workspace.join(".git")).unwrap();
        fs::write(workspace.join(".git/config"), b"").unwrap();

        let guard = WorkspaceGuard::new(workspace).unwrap();
        assert!(matches!(
            guard.resolve_patch_path(".git/config"),
            Err(SafetyError::ForbiddenPath { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();

        let outside = temp_dir.path().join("outside.rs");
        fs::write(&outside, b"").unwrap();
        symlink(&outside, workspace.join("escape.rs")).unwrap();

        let guard = WorkspaceGuard::new(&workspace).unwrap();
        assert!(matches!(
            guard.resolve_patch_path("escape.rs"),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
    }
}
