//! Native apply collaborator: an external exact-context patch tool.
//!
//! Tier 1 of the escalation ladder delegates to a battle-tested applier
//! before any fuzzy logic runs. The production implementation shells out
//! to `git apply` with whitespace tolerance; tests substitute mocks
//! through the [`NativeApply`] trait.

use crate::diff::Patch;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Outcome of one native apply invocation. Any non-success (non-zero
/// status, spawn failure, reject files) is failure; the caller owns
/// escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeOutcome {
    pub success: bool,
    pub stderr: String,
}

impl NativeOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
        }
    }
}

/// External exact-context apply tool.
pub trait NativeApply {
    /// Apply `patch_text` inside `repo_root`, mutating files on success.
    fn apply(&self, repo_root: &Path, patch_text: &str) -> NativeOutcome;

    /// Verify applicability without touching the working tree.
    fn check(&self, repo_root: &Path, patch_text: &str) -> NativeOutcome;
}

/// `git apply` with whitespace tolerance enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitApply;

impl GitApply {
    fn run(&self, repo_root: &Path, patch_text: &str, check_only: bool) -> NativeOutcome {
        let mut args = vec!["apply", "--ignore-whitespace", "--whitespace=nowarn"];
        if check_only {
            args.push("--check");
        }

        let child = Command::new("git")
            .args(&args)
            .current_dir(repo_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(c) => c,
            Err(e) => return NativeOutcome::failed(format!("failed to spawn git apply: {e}")),
        };

        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(patch_text.as_bytes()) {
                return NativeOutcome::failed(format!("failed to feed patch to git apply: {e}"));
            }
        }
        drop(child.stdin.take());

        let output = match child.wait_with_output() {
            Ok(o) => o,
            Err(e) => return NativeOutcome::failed(format!("git apply did not exit cleanly: {e}")),
        };

        if output.status.success() {
            NativeOutcome::ok()
        } else {
            let outcome = NativeOutcome::failed(String::from_utf8_lossy(&output.stderr).to_string());
            if !check_only {
                cleanup_reject_artifacts(repo_root, patch_text);
            }
            outcome
        }
    }
}

impl NativeApply for GitApply {
    fn apply(&self, repo_root: &Path, patch_text: &str) -> NativeOutcome {
        self.run(repo_root, patch_text, false)
    }

    fn check(&self, repo_root: &Path, patch_text: &str) -> NativeOutcome {
        self.run(repo_root, patch_text, true)
    }
}

/// Remove `.rej` / `.orig` artifacts a failed native apply may leave next
/// to the files named in the patch. The engine treats rejects as failure
/// evidence, not as state to keep around.
fn cleanup_reject_artifacts(repo_root: &Path, patch_text: &str) {
    for path in Patch::parse(patch_text).paths() {
        for suffix in [".rej", ".orig"] {
            let artifact = repo_root.join(format!("{path}{suffix}"));
            if artifact.is_file() {
                let _ = std::fs::remove_file(&artifact);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cleanup_removes_reject_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("file.rs"), "content\n").unwrap();
        fs::write(temp_dir.path().join("file.rs.rej"), "reject\n").unwrap();
        fs::write(temp_dir.path().join("file.rs.orig"), "orig\n").unwrap();

        let patch = "--- a/file.rs\n+++ b/file.rs\n@@ -1 +1 @@\n-content\n+new\n";
        cleanup_reject_artifacts(temp_dir.path(), patch);

        assert!(temp_dir.path().join("file.rs").exists());
        assert!(!temp_dir.path().join("file.rs.rej").exists());
        assert!(!temp_dir.path().join("file.rs.orig").exists());
    }

    #[test]
    fn test_cleanup_ignores_unrelated_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("other.rs.rej"), "reject\n").unwrap();

        let patch = "--- a/file.rs\n+++ b/file.rs\n@@ -1 +1 @@\n-a\n+b\n";
        cleanup_reject_artifacts(temp_dir.path(), patch);

        assert!(temp_dir.path().join("other.rs.rej").exists());
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(NativeOutcome::ok().success);
        let failed = NativeOutcome::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.stderr, "boom");
    }
}
