//! Hunk application against an in-memory line buffer.
//!
//! This layer always produces output; structurally invalid patches were
//! rejected before any hunk processing began, and positional uncertainty
//! was resolved (or flagged) by the locator. What remains is a cursor walk
//! that reconciles the hunk body with the real file.
//!
//! Whitespace policy: when a context line differs from the file only by
//! whitespace, the file's own text is emitted (trust-the-file). The engine
//! never introduces formatting noise into lines it was not asked to touch.

use crate::diff::parser::{Hunk, HunkLine};

/// Result of applying one hunk: the new line buffer plus reconciliation
/// evidence the escalation controller uses to judge the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub lines: Vec<String>,
    /// Context lines that matched the file exactly.
    pub context_exact: usize,
    /// Context lines reconciled by trusting the file's whitespace.
    pub context_whitespace: usize,
    /// Context or removed lines that disagreed with the file beyond
    /// whitespace. The file's text is preserved for context lines; a
    /// non-zero count at a fallback position means the edit is suspect.
    pub context_mismatched: usize,
}

impl Applied {
    /// True when every context/removed line agreed with the file, modulo
    /// whitespace.
    pub fn is_clean(&self) -> bool {
        self.context_mismatched == 0
    }
}

/// Apply `hunk` to `file_lines` at `position` (0-based), returning a new
/// buffer. The input is not mutated; each escalation tier stays
/// side-effect-free until the final write.
pub fn apply_hunk(file_lines: &[String], hunk: &Hunk, position: usize) -> Applied {
    let position = position.min(file_lines.len());
    let mut emitted: Vec<String> = Vec::with_capacity(hunk.new_span());
    let mut cursor = position;
    let mut context_exact = 0;
    let mut context_whitespace = 0;
    let mut context_mismatched = 0;

    for line in &hunk.lines {
        match line {
            HunkLine::Context(text) => {
                match file_lines.get(cursor) {
                    Some(actual) if actual == text => {
                        context_exact += 1;
                        emitted.push(actual.clone());
                    }
                    Some(actual) if actual.trim() == text.trim() => {
                        // Whitespace divergence: the file wins.
                        context_whitespace += 1;
                        emitted.push(actual.clone());
                    }
                    Some(actual) => {
                        // Hard mismatch. Still prefer the live file over
                        // stale model context, but count the disagreement.
                        context_mismatched += 1;
                        emitted.push(actual.clone());
                    }
                    None => {
                        // Cursor ran past EOF; the hunk text is all we have.
                        context_mismatched += 1;
                        emitted.push(text.clone());
                    }
                }
                cursor += 1;
            }
            HunkLine::Removed(text) => {
                // Deletion: advance without emitting. A disagreement here
                // means we are deleting something other than what the
                // patch believed was there.
                match file_lines.get(cursor) {
                    Some(actual) if actual == text || actual.trim() == text.trim() => {}
                    _ => context_mismatched += 1,
                }
                cursor += 1;
            }
            HunkLine::Added(text) => {
                // Insertion: emit without advancing.
                emitted.push(text.clone());
            }
        }
    }

    let splice_end = (position + hunk.old_span()).min(file_lines.len());

    let mut lines = Vec::with_capacity(file_lines.len() - (splice_end - position) + emitted.len());
    lines.extend_from_slice(&file_lines[..position]);
    lines.extend(emitted);
    lines.extend_from_slice(&file_lines[splice_end..]);

    Applied {
        lines,
        context_exact,
        context_whitespace,
        context_mismatched,
    }
}
