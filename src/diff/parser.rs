//! Lenient unified-diff parser for model-generated patch text.
//!
//! Model output frequently deviates from strict unified-diff format:
//! hunk headers arrive as a bare `@@` with no line numbers, context lines
//! lose their leading space, counts are wrong. The parser accepts all of
//! that and produces a structured [`Patch`]; structural rejection happens
//! separately in [`crate::validate`], and numeric repair happens in
//! [`crate::diff::header`].

/// Marker opening a new file section (old side).
pub const OLD_FILE_MARKER: &str = "--- ";
/// Marker carrying the new-side path.
pub const NEW_FILE_MARKER: &str = "+++ ";
/// Marker opening a hunk, with or without numeric ranges.
pub const HUNK_MARKER: &str = "@@";

/// A single line inside a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    /// Unchanged line, present to anchor and verify position.
    Context(String),
    /// Line inserted by the patch.
    Added(String),
    /// Line deleted by the patch.
    Removed(String),
}

impl HunkLine {
    /// The line text regardless of variant.
    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(t) | HunkLine::Added(t) | HunkLine::Removed(t) => t,
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, HunkLine::Context(_))
    }

    pub fn is_added(&self) -> bool {
        matches!(self, HunkLine::Added(_))
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, HunkLine::Removed(_))
    }
}

/// A contiguous block of changes anchored to a position in the old file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based start line in the old file.
    pub old_start: usize,
    /// Count of context + removed lines.
    pub old_count: usize,
    /// 1-based start line in the new file.
    pub new_start: usize,
    /// Count of context + added lines.
    pub new_count: usize,
    /// Body lines in source order.
    pub lines: Vec<HunkLine>,
    /// True when the header carried no usable numbers and needs synthesis.
    pub needs_header_synthesis: bool,
}

impl Hunk {
    fn empty() -> Self {
        Self {
            old_start: 1,
            old_count: 0,
            new_start: 1,
            new_count: 0,
            lines: Vec::new(),
            needs_header_synthesis: true,
        }
    }

    /// Tally of context + removed lines, i.e. how many old-file lines the
    /// hunk spans. Recomputed from the body rather than trusted from the
    /// header, since model headers lie.
    pub fn old_span(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.is_context() || l.is_removed())
            .count()
    }

    /// Tally of context + added lines (new-file span).
    pub fn new_span(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.is_context() || l.is_added())
            .count()
    }

    /// True when the hunk has no context or removed line to anchor on
    /// (pure insertion).
    pub fn is_pure_insertion(&self) -> bool {
        self.lines.iter().all(|l| l.is_added())
    }
}

/// All hunks targeting one file, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Relative path as written in the patch headers (unsanitized; callers
    /// must pass it through [`crate::safety`] before touching the disk).
    pub path: String,
    pub hunks: Vec<Hunk>,
}

/// An ordered sequence of per-file patches parsed from raw text.
///
/// Immutable once parsed; a corrected patch from the generator is
/// re-parsed from scratch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub files: Vec<FilePatch>,
}

impl Patch {
    /// Parse raw patch text. Never fails: malformed structure yields an
    /// empty or partial patch, which [`crate::validate::validate_format`]
    /// is responsible for rejecting up front.
    pub fn parse(text: &str) -> Patch {
        let mut parser = Parser::default();
        for line in text.lines() {
            parser.feed(line);
        }
        parser.finish()
    }

    /// Total number of hunks across all files.
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }

    /// Paths named by the patch, in order of first appearance.
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

#[derive(Default)]
struct Parser {
    files: Vec<FilePatch>,
    current_file: Option<FilePatch>,
    current_hunk: Option<Hunk>,
    /// Old/new-side body lines the active numbered hunk header still owes.
    /// While either is nonzero, `--- `/`+++ ` lines are hunk body (a
    /// removed `-- comment` renders as `--- comment`), not file markers.
    remaining_old: usize,
    remaining_new: usize,
}

impl Parser {
    fn feed(&mut self, line: &str) {
        let in_numbered_body =
            self.current_hunk.is_some() && (self.remaining_old > 0 || self.remaining_new > 0);

        if !in_numbered_body {
            if let Some(rest) = line.strip_prefix(OLD_FILE_MARKER) {
                self.flush_file();
                self.current_file = Some(FilePatch {
                    path: strip_diff_prefix(rest, "a/"),
                    hunks: Vec::new(),
                });
                return;
            }

            if let Some(rest) = line.strip_prefix(NEW_FILE_MARKER) {
                // The new-side path wins when it names a real file; `/dev/null`
                // means a deletion and the old-side path stays authoritative.
                let path = strip_diff_prefix(rest, "b/");
                if path != "/dev/null" {
                    if let Some(file) = self.current_file.as_mut() {
                        file.path = path;
                    }
                }
                return;
            }
        }

        if line.starts_with(HUNK_MARKER) {
            self.flush_hunk();
            let hunk = parse_hunk_header(line);
            if hunk.needs_header_synthesis {
                // Bare header: no counts to budget body lines against.
                self.remaining_old = 0;
                self.remaining_new = 0;
            } else {
                self.remaining_old = hunk.old_count;
                self.remaining_new = hunk.new_count;
            }
            self.current_hunk = Some(hunk);
            return;
        }

        let Some(hunk) = self.current_hunk.as_mut() else {
            // Preamble noise (`diff --git`, `index`, commentary) before the
            // first hunk is ignored.
            return;
        };

        if line.starts_with('\\') {
            // "\ No newline at end of file" marker; newline handling is
            // the applicator's concern, not a body line.
            return;
        }

        if let Some(added) = line.strip_prefix('+') {
            hunk.lines.push(HunkLine::Added(added.to_string()));
            self.remaining_new = self.remaining_new.saturating_sub(1);
        } else if let Some(removed) = line.strip_prefix('-') {
            hunk.lines.push(HunkLine::Removed(removed.to_string()));
            self.remaining_old = self.remaining_old.saturating_sub(1);
        } else if let Some(context) = line.strip_prefix(' ') {
            hunk.lines.push(HunkLine::Context(context.to_string()));
            self.remaining_old = self.remaining_old.saturating_sub(1);
            self.remaining_new = self.remaining_new.saturating_sub(1);
        } else if !line.is_empty() {
            // Unprefixed non-empty line: tolerated as context. Deliberate
            // compatibility shim for imperfect model output; tightening
            // this to strict unified-diff breaks previously-valid patches.
            hunk.lines.push(HunkLine::Context(line.to_string()));
            self.remaining_old = self.remaining_old.saturating_sub(1);
            self.remaining_new = self.remaining_new.saturating_sub(1);
        } else {
            // A fully empty line inside a hunk body is an empty context
            // line whose leading space was eaten somewhere upstream.
            hunk.lines.push(HunkLine::Context(String::new()));
            self.remaining_old = self.remaining_old.saturating_sub(1);
            self.remaining_new = self.remaining_new.saturating_sub(1);
        }
    }

    fn flush_hunk(&mut self) {
        if let Some(mut hunk) = self.current_hunk.take() {
            if hunk.lines.is_empty() {
                return;
            }
            if hunk.needs_header_synthesis {
                // Counts are always recomputable from the body.
                hunk.old_count = hunk.old_span();
                hunk.new_count = hunk.new_span();
            }
            if let Some(file) = self.current_file.as_mut() {
                file.hunks.push(hunk);
            }
        }
    }

    fn flush_file(&mut self) {
        self.flush_hunk();
        if let Some(file) = self.current_file.take() {
            if !file.hunks.is_empty() {
                self.files.push(file);
            }
        }
    }

    fn finish(mut self) -> Patch {
        self.flush_file();
        Patch { files: self.files }
    }
}

/// Strip an optional `a/` / `b/` prefix and trailing metadata (timestamps
/// after a tab) from a file-header path.
fn strip_diff_prefix(rest: &str, prefix: &str) -> String {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path == "/dev/null" {
        return path.to_string();
    }
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// Parse a hunk header line. Canonical `@@ -old,count +new,count @@` fills
/// all numeric fields; a bare `@@` (or any unparsable range) yields a hunk
/// flagged for header synthesis.
pub(crate) fn parse_hunk_header(line: &str) -> Hunk {
    let mut hunk = Hunk::empty();

    let body = line.trim_start_matches('@').trim();
    let body = match body.find("@@") {
        Some(idx) => body[..idx].trim(),
        None => body,
    };

    let mut old_range = None;
    let mut new_range = None;
    for token in body.split_whitespace() {
        if let Some(range) = token.strip_prefix('-') {
            old_range = parse_range(range);
        } else if let Some(range) = token.strip_prefix('+') {
            new_range = parse_range(range);
        }
    }

    if let (Some((old_start, old_count)), Some((new_start, new_count))) = (old_range, new_range) {
        hunk.old_start = old_start.max(1);
        hunk.old_count = old_count;
        hunk.new_start = new_start.max(1);
        hunk.new_count = new_count;
        hunk.needs_header_synthesis = false;
    }

    hunk
}

/// Parse `start[,count]`; a missing count means 1 per unified-diff rules.
fn parse_range(range: &str) -> Option<(usize, usize)> {
    let mut parts = range.splitn(2, ',');
    let start = parts.next()?.parse::<usize>().ok()?;
    let count = match parts.next() {
        Some(c) => c.parse::<usize>().ok()?,
        None => 1,
    };
    Some((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_patch() {
        let text = "\
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn main() {
-    old();
+    new();
 }
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].path, "src/lib.rs");
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.old_count, 3);
        assert!(!hunk.needs_header_synthesis);
        assert_eq!(hunk.lines.len(), 4);
        assert!(hunk.lines[1].is_removed());
        assert!(hunk.lines[2].is_added());
    }

    #[test]
    fn test_parse_bare_hunk_header() {
        let text = "\
--- a/file.txt
+++ b/file.txt
@@
 context
-old
+new
";
        let patch = Patch::parse(text);
        let hunk = &patch.files[0].hunks[0];
        assert!(hunk.needs_header_synthesis);
        assert_eq!(hunk.old_count, 2); // context + removed
        assert_eq!(hunk.new_count, 2); // context + added
    }

    #[test]
    fn test_parse_unprefixed_line_is_context() {
        let text = "\
--- a/file.txt
+++ b/file.txt
@@ -1,2 +1,3 @@
fn helper() {
+    added();
 }
";
        let patch = Patch::parse(text);
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.lines[0], HunkLine::Context("fn helper() {".to_string()));
    }

    #[test]
    fn test_parse_multiple_files_preserves_order() {
        let text = "\
--- a/first.rs
+++ b/first.rs
@@ -1 +1 @@
-a
+b
--- a/second.rs
+++ b/second.rs
@@ -1 +1 @@
-c
+d
";
        let patch = Patch::parse(text);
        assert_eq!(patch.paths(), vec!["first.rs", "second.rs"]);
    }

    #[test]
    fn test_parse_multiple_hunks_same_file() {
        let text = "\
--- a/file.txt
+++ b/file.txt
@@ -1,2 +1,2 @@
 one
-two
+TWO
@@ -10,2 +10,2 @@
 ten
-eleven
+ELEVEN
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].hunks.len(), 2);
        assert_eq!(patch.files[0].hunks[1].old_start, 10);
    }

    #[test]
    fn test_parse_dev_null_keeps_old_path() {
        let text = "\
--- a/deleted.rs
+++ /dev/null
@@ -1 +0,0 @@
-gone
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files[0].path, "deleted.rs");
    }

    #[test]
    fn test_parse_new_side_path_overrides() {
        let text = "\
--- a/old_name.rs
+++ b/new_name.rs
@@ -1 +1 @@
-a
+b
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files[0].path, "new_name.rs");
    }

    #[test]
    fn test_parse_ignores_git_preamble() {
        let text = "\
diff --git a/file.txt b/file.txt
index 1234567..89abcde 100644
--- a/file.txt
+++ b/file.txt
@@ -1 +1 @@
-a
+b
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].hunks[0].lines.len(), 2);
    }

    #[test]
    fn test_parse_malformed_yields_empty_patch() {
        let patch = Patch::parse("this is not a patch at all\njust prose\n");
        assert!(patch.files.is_empty());
        assert_eq!(patch.hunk_count(), 0);
    }

    #[test]
    fn test_parse_header_with_trailing_section_heading() {
        // git appends the enclosing function after the second `@@`.
        let text = "\
--- a/file.rs
+++ b/file.rs
@@ -4,3 +4,3 @@ fn enclosing() {
 a
-b
+B
";
        let patch = Patch::parse(text);
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.old_start, 4);
        assert!(!hunk.needs_header_synthesis);
    }

    #[test]
    fn test_parse_range_without_count() {
        let text = "\
--- a/file.rs
+++ b/file.rs
@@ -7 +7 @@
-a
+b
";
        let patch = Patch::parse(text);
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.old_start, 7);
        assert_eq!(hunk.old_count, 1);
    }

    #[test]
    fn test_old_span_counts_context_and_removed() {
        let hunk = Hunk {
            old_start: 1,
            old_count: 0,
            new_start: 1,
            new_count: 0,
            lines: vec![
                HunkLine::Context("a".into()),
                HunkLine::Removed("b".into()),
                HunkLine::Added("c".into()),
                HunkLine::Context("d".into()),
            ],
            needs_header_synthesis: true,
        };
        assert_eq!(hunk.old_span(), 3);
        assert_eq!(hunk.new_span(), 3);
        assert!(!hunk.is_pure_insertion());
    }

    #[test]
    fn test_parse_removed_dash_comment_stays_in_hunk() {
        // Removing `-- old comment` renders as `--- old comment`; with the
        // numbered header owing body lines, that is a Removed line, not
        // the start of a new file section.
        let text = "\
--- a/schema.sql
+++ b/schema.sql
@@ -1,3 +1,2 @@
 select 1;
--- old comment
 select 2;
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files.len(), 1);
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 3);
        assert_eq!(
            hunk.lines[1],
            HunkLine::Removed("-- old comment".to_string())
        );
    }

    #[test]
    fn test_parse_file_marker_after_exhausted_body_opens_new_file() {
        let text = "\
--- a/a.sql
+++ b/a.sql
@@ -1,2 +1,1 @@
 keep
--- drop comment
--- a/b.sql
+++ b/b.sql
@@ -1 +1 @@
-x
+y
";
        let patch = Patch::parse(text);
        assert_eq!(patch.paths(), vec!["a.sql", "b.sql"]);
        assert_eq!(
            patch.files[0].hunks[0].lines[1],
            HunkLine::Removed("-- drop comment".to_string())
        );
    }

    #[test]
    fn test_parse_skips_no_newline_marker() {
        let text = "\
--- a/file.txt
+++ b/file.txt
@@ -1 +1 @@
-a
+b
\\ No newline at end of file
";
        let patch = Patch::parse(text);
        assert_eq!(patch.files[0].hunks[0].lines.len(), 2);
    }

    #[test]
    fn test_pure_insertion_detection() {
        let hunk = Hunk {
            lines: vec![HunkLine::Added("x".into()), HunkLine::Added("y".into())],
            ..Hunk::empty()
        };
        assert!(hunk.is_pure_insertion());
    }
}
