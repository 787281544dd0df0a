//! End-to-end fuzzy reconciliation against real files on disk.
//!
//! Exercises the full parse → synthesize → locate → apply → atomic-write
//! chain through `DiskStore`, including the failure paths that must leave
//! the tree untouched.

use diffmend::{reconcile, DiskStore, FuzzyError, WorkspaceGuard};
use std::fs;
use tempfile::TempDir;

fn setup_workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
    }
    dir
}

fn disk_store(dir: &TempDir) -> DiskStore {
    DiskStore::new(WorkspaceGuard::new(dir.path()).unwrap())
}

#[test]
fn test_drifted_patch_lands_on_disk() {
    // The patch says line 2; the real target sits much further down.
    let mut content = String::new();
    for i in 0..20 {
        content.push_str(&format!("filler {i}\n"));
    }
    content.push_str("let port = 8080;\nlet host = \"localhost\";\n");

    let dir = setup_workspace(&[("src/config.rs", &content)]);
    let mut store = disk_store(&dir);

    let patch = "\
--- a/src/config.rs
+++ b/src/config.rs
@@ -2,2 +2,2 @@
-let port = 8080;
+let port = 9090;
 let host = \"localhost\";
";

    let report = reconcile(&mut store, patch).unwrap();
    assert_eq!(report.modified_files, vec!["src/config.rs"]);
    assert!(report.warnings.iter().any(|w| w.contains("relocated")));

    let after = fs::read_to_string(dir.path().join("src/config.rs")).unwrap();
    assert!(after.contains("let port = 9090;"));
    assert!(!after.contains("let port = 8080;"));
    assert!(after.ends_with('\n'));
}

#[test]
fn test_bare_header_synthesized_from_disk_content() {
    let dir = setup_workspace(&[(
        "notes.txt",
        "intro\nsection one\nbody line\nsection two\noutro\n",
    )]);
    let mut store = disk_store(&dir);

    let patch = "\
--- a/notes.txt
+++ b/notes.txt
@@
 section one
-body line
+revised body line
";

    let report = reconcile(&mut store, patch).unwrap();
    assert_eq!(report.modified_files, vec!["notes.txt"]);

    let after = fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert_eq!(
        after,
        "intro\nsection one\nrevised body line\nsection two\noutro\n"
    );
}

#[test]
fn test_rejected_hunk_leaves_every_file_untouched() {
    let dir = setup_workspace(&[
        ("first.txt", "a\nb\nc\n"),
        ("second.txt", "x\ny\nz\n"),
    ]);
    let mut store = disk_store(&dir);

    // First file applies cleanly; the second names content that does not
    // exist anywhere, so the run must fail without writing either file.
    let patch = "\
--- a/first.txt
+++ b/first.txt
@@ -1,2 +1,2 @@
 a
-b
+B
--- a/second.txt
+++ b/second.txt
@@ -1,3 +1,3 @@
 nothing
-like
+this
 exists
";

    let err = reconcile(&mut store, patch).unwrap_err();
    assert!(matches!(err, FuzzyError::HunkRejected { .. }));

    assert_eq!(
        fs::read_to_string(dir.path().join("first.txt")).unwrap(),
        "a\nb\nc\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("second.txt")).unwrap(),
        "x\ny\nz\n"
    );
}

#[test]
fn test_path_traversal_is_refused() {
    let dir = setup_workspace(&[("safe.txt", "content\n")]);
    let mut store = disk_store(&dir);

    let patch = "\
--- a/../outside.txt
+++ b/../outside.txt
@@ -1 +1 @@
-content
+evil
";

    let err = reconcile(&mut store, patch).unwrap_err();
    assert!(matches!(err, FuzzyError::Read { .. }));
    assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
}

#[test]
fn test_missing_file_reports_read_error() {
    let dir = setup_workspace(&[]);
    let mut store = disk_store(&dir);

    let patch = "\
--- a/ghost.txt
+++ b/ghost.txt
@@ -1 +1 @@
-a
+b
";

    let err = reconcile(&mut store, patch).unwrap_err();
    match err {
        FuzzyError::Read { path, .. } => assert_eq!(path, "ghost.txt"),
        other => panic!("expected read error, got {other:?}"),
    }
}

#[test]
fn test_file_without_trailing_newline_stays_that_way() {
    let dir = setup_workspace(&[("raw.txt", "one\ntwo\nthree")]);
    let mut store = disk_store(&dir);

    let patch = "\
--- a/raw.txt
+++ b/raw.txt
@@ -2 +2 @@
-two
+TWO
";

    reconcile(&mut store, patch).unwrap();
    let after = fs::read_to_string(dir.path().join("raw.txt")).unwrap();
    assert_eq!(after, "one\nTWO\nthree");
}

#[test]
fn test_reapplying_same_patch_is_a_no_op() {
    let dir = setup_workspace(&[("app.rs", "fn main() {\n    old();\n}\n")]);

    let patch = "\
--- a/app.rs
+++ b/app.rs
@@ -1,3 +1,3 @@
 fn main() {
-    old();
+    new();
 }
";

    let mut store = disk_store(&dir);
    let first = reconcile(&mut store, patch).unwrap();
    assert_eq!(first.modified_files, vec!["app.rs"]);

    let mut store = disk_store(&dir);
    let second = reconcile(&mut store, patch).unwrap();
    assert!(second.modified_files.is_empty());

    let after = fs::read_to_string(dir.path().join("app.rs")).unwrap();
    assert_eq!(after, "fn main() {\n    new();\n}\n");
}
