//! Structural validation of raw patch text.
//!
//! Runs before any hunk processing. The parser itself never fails, so this
//! is the single place where a patch can be rejected outright:
//!
//! 1. **File headers present**: at least one `--- ` / `+++ ` pair.
//! 2. **Hunks present**: at least one `@@` marker.
//! 3. **Ordering**: no hunk marker before the first file header.
//! 4. **Balance**: every `--- ` has a matching `+++ `.
//!
//! Format errors are fatal immediately and never enter the escalation
//! ladder; a patch that fails here will fail identically on every tier.

use crate::diff::parser::{parse_hunk_header, HUNK_MARKER, NEW_FILE_MARKER, OLD_FILE_MARKER};
use thiserror::Error;

/// Fatal structural defects in patch text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("patch contains no file headers (expected `--- a/<path>` / `+++ b/<path>`)")]
    MissingFileHeaders,

    #[error("patch contains no hunk markers (expected `@@`)")]
    MissingHunks,

    #[error("hunk marker at line {line} appears before any file header")]
    HunkBeforeFileHeader { line: usize },

    #[error("unbalanced file markers: {old_markers} old-side (`--- `) vs {new_markers} new-side (`+++ `)")]
    UnbalancedFileMarkers {
        old_markers: usize,
        new_markers: usize,
    },
}

/// Validate the structure of raw patch text.
///
/// A numbered hunk header budgets its body: while either side's declared
/// count is unexhausted, `--- `/`+++ ` lines are body (a removed
/// `-- comment` renders as `--- comment`), not file markers.
pub fn validate_format(text: &str) -> Result<(), FormatError> {
    let mut old_markers = 0usize;
    let mut new_markers = 0usize;
    let mut hunk_markers = 0usize;
    let mut remaining_old = 0usize;
    let mut remaining_new = 0usize;

    for (idx, line) in text.lines().enumerate() {
        if line.starts_with(HUNK_MARKER) {
            if old_markers == 0 {
                return Err(FormatError::HunkBeforeFileHeader { line: idx + 1 });
            }
            hunk_markers += 1;
            let header = parse_hunk_header(line);
            if header.needs_header_synthesis {
                remaining_old = 0;
                remaining_new = 0;
            } else {
                remaining_old = header.old_count;
                remaining_new = header.new_count;
            }
            continue;
        }

        let in_numbered_body = remaining_old > 0 || remaining_new > 0;

        if !in_numbered_body {
            if line.starts_with(OLD_FILE_MARKER) {
                old_markers += 1;
            } else if line.starts_with(NEW_FILE_MARKER) {
                new_markers += 1;
            }
            continue;
        }

        if line.starts_with('\\') {
            // No-newline marker, not a body line.
            continue;
        }

        if line.starts_with('+') {
            remaining_new = remaining_new.saturating_sub(1);
        } else if line.starts_with('-') {
            remaining_old = remaining_old.saturating_sub(1);
        } else {
            remaining_old = remaining_old.saturating_sub(1);
            remaining_new = remaining_new.saturating_sub(1);
        }
    }

    if old_markers == 0 && new_markers == 0 {
        return Err(FormatError::MissingFileHeaders);
    }

    if old_markers != new_markers {
        return Err(FormatError::UnbalancedFileMarkers {
            old_markers,
            new_markers,
        });
    }

    if hunk_markers == 0 {
        return Err(FormatError::MissingHunks);
    }

    Ok(())
}
