//! Tier-2 fuzzy reconciliation pipeline.
//!
//! Runs the full parse → synthesize → locate → apply chain over a patch,
//! bypassing the native tool entirely. Each file is transformed in memory
//! and written once, after all of its hunks applied; hunks within a file
//! run sequentially against the progressively-mutated buffer, in parse
//! order.

use crate::diff::{apply_hunk, locate, synthesize, MatchQuality, Patch, SynthesisOutcome};
use crate::store::FileStore;
use crate::validate::validate_format;
use thiserror::Error;

/// Why the fuzzy tier could not land a patch.
#[derive(Error, Debug)]
pub enum FuzzyError {
    /// Structural defect: fatal for the whole ladder, not just this tier.
    #[error(transparent)]
    Format(#[from] crate::validate::FormatError),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: crate::store::StoreError,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: crate::store::StoreError,
    },

    /// A hunk landed on a below-threshold fallback position and its
    /// context disagreed with the file beyond whitespace. Applying it
    /// anyway would be a silent wrong edit.
    #[error("hunk {hunk} of {path} could not be placed: {detail}")]
    HunkRejected {
        path: String,
        hunk: usize,
        detail: String,
    },
}

impl FuzzyError {
    /// Format errors abort the ladder; everything else escalates.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FuzzyError::Format(_))
    }
}

/// Successful fuzzy application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzyReport {
    /// Files whose content actually changed and was written.
    pub modified_files: Vec<String>,
    /// Non-fatal degradations: missing anchors, whitespace reconciliation,
    /// fuzzy relocations. Surfaced for logging and regenerate feedback.
    pub warnings: Vec<String>,
}

/// Apply `patch_text` through `store` with header synthesis and fuzzy
/// relocation. All-or-nothing per run: the first rejected hunk fails the
/// whole attempt and nothing is written for that or later files.
pub fn reconcile(store: &mut dyn FileStore, patch_text: &str) -> Result<FuzzyReport, FuzzyError> {
    validate_format(patch_text)?;
    let patch = Patch::parse(patch_text);

    let mut report = FuzzyReport::default();
    // Buffer all writes until every hunk of every file has been placed,
    // so a rejection halfway through leaves the store untouched.
    let mut pending: Vec<(String, String)> = Vec::new();

    for file_patch in &patch.files {
        let path = &file_patch.path;
        let original = store.read(path).map_err(|source| FuzzyError::Read {
            path: path.clone(),
            source,
        })?;

        let had_trailing_newline = original.ends_with('\n');
        let mut lines: Vec<String> = original.lines().map(String::from).collect();

        for (idx, hunk) in file_patch.hunks.iter().enumerate() {
            let (hunk, synthesis) = synthesize(hunk.clone(), &lines);
            if synthesis == SynthesisOutcome::NoAnchor {
                report.warnings.push(format!(
                    "{path} hunk {}: no anchor line found, relying on fuzzy search",
                    idx + 1
                ));
            }

            let location = locate(&lines, &hunk);
            let applied = apply_hunk(&lines, &hunk, location.position);

            match location.quality {
                MatchQuality::Exact => {}
                MatchQuality::Fuzzy => {
                    let mut warning = format!(
                        "{path} hunk {}: relocated to line {} (score {:.1}/{:.1})",
                        idx + 1,
                        location.position + 1,
                        location.score,
                        location.max_score
                    );
                    if !applied.is_clean() {
                        // Accepted, but the disagreement must stay visible.
                        warning.push_str(&format!(
                            "; {} context line(s) disagreed beyond whitespace",
                            applied.context_mismatched
                        ));
                    }
                    report.warnings.push(warning);
                }
                MatchQuality::Fallback => {
                    if !applied.is_clean() {
                        let note = location.note.unwrap_or_default();
                        return Err(FuzzyError::HunkRejected {
                            path: path.clone(),
                            hunk: idx + 1,
                            detail: format!(
                                "{} context line(s) disagree at the declared position; {note}",
                                applied.context_mismatched
                            ),
                        });
                    }
                    report.warnings.push(format!(
                        "{path} hunk {}: applied at declared position despite low match score",
                        idx + 1
                    ));
                }
            }

            if applied.context_whitespace > 0 {
                report.warnings.push(format!(
                    "{path} hunk {}: {} context line(s) reconciled by trusting file whitespace",
                    idx + 1,
                    applied.context_whitespace
                ));
            }

            lines = applied.lines;
        }

        let mut new_content = lines.join("\n");
        if had_trailing_newline && !new_content.is_empty() {
            new_content.push('\n');
        }

        if new_content != original {
            report.modified_files.push(path.clone());
            pending.push((path.clone(), new_content));
        }
    }

    for (path, content) in pending {
        store
            .write(&path, &content)
            .map_err(|source| FuzzyError::Write { path, source })?;
    }

    Ok(report)
}
