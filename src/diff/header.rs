//! Header synthesis for hunks whose `@@` carried no line numbers.
//!
//! Models routinely emit a bare `@@` and leave anchoring to the consumer.
//! Synthesis anchors on the first Context or Removed line found verbatim
//! in the target file; Added lines are useless as anchors because they do
//! not exist in the old file yet.
//!
//! Known approximation: `new_start` is set equal to `old_start`, with no
//! running offset across earlier hunks in the same file. Hunks that change
//! line counts upstream of later hunks desynchronize `new_start`; the
//! fuzzy locator exists partly to absorb exactly that drift, so the
//! approximation is kept rather than papered over.

use crate::diff::parser::Hunk;

/// Outcome of a synthesis pass over one hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Header already carried usable numbers; hunk untouched.
    AlreadyNumbered,
    /// Anchor line found; `old_start`/`new_start` now point at it.
    Anchored { anchor_line: usize },
    /// No anchor line exists in the file. The start fields keep their
    /// parsed value (1 for a bare header) and fuzzy search is mandatory.
    /// Recoverable degradation, not a failure.
    NoAnchor,
}

/// Fill numeric header fields for a hunk parsed from a bare `@@`.
///
/// Returns the (possibly updated) hunk together with what happened, so the
/// caller can log the degradation path.
pub fn synthesize(mut hunk: Hunk, file_lines: &[String]) -> (Hunk, SynthesisOutcome) {
    if !hunk.needs_header_synthesis {
        return (hunk, SynthesisOutcome::AlreadyNumbered);
    }

    // Counts never depend on the anchor; recompute unconditionally.
    hunk.old_count = hunk.old_span();
    hunk.new_count = hunk.new_span();

    let Some(anchor_text) = hunk
        .lines
        .iter()
        .find(|l| l.is_context() || l.is_removed())
        .map(|l| l.text().to_string())
    else {
        // Pure-insertion hunk: nothing to anchor on.
        return (hunk, SynthesisOutcome::NoAnchor);
    };

    match file_lines.iter().position(|l| *l == anchor_text) {
        Some(idx) => {
            let line = idx + 1;
            hunk.old_start = line;
            // Unmodified prefixes keep position parity between old and new
            // file in this design; no cross-hunk offset accumulation.
            hunk.new_start = line;
            hunk.needs_header_synthesis = false;
            (hunk, SynthesisOutcome::Anchored { anchor_line: line })
        }
        None => (hunk, SynthesisOutcome::NoAnchor),
    }
}
