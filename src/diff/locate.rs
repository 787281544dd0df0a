//! Scored approximate matching of a hunk against the real file.
//!
//! The declared `old_start` of a model-generated hunk is a hint, not a
//! fact: files drift between the model reading them and the patch landing.
//! The locator searches a bounded window around the expected position and
//! scores each candidate alignment line by line.

use crate::diff::parser::Hunk;

/// Symmetric search window around the expected position, in lines.
pub const SEARCH_WINDOW: usize = 50;

/// Per-line score for an exact match.
const SCORE_EXACT: f32 = 1.0;
/// Per-line score for a whitespace-insensitive (trimmed) match.
const SCORE_TRIMMED: f32 = 0.8;
/// Accept the best candidate only when it reaches this fraction of the
/// maximum possible score.
const ACCEPT_RATIO: f32 = 0.5;

/// How a position was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// The hunk's old lines match exactly at the declared position.
    Exact,
    /// Best-scoring candidate inside the search window, at or above the
    /// acceptance threshold.
    Fuzzy,
    /// No candidate reached the threshold; the declared position is
    /// returned anyway so downstream context reconciliation can absorb
    /// minor slack. Known not to match — never treat the resulting edit
    /// as guaranteed-correct.
    Fallback,
}

/// A located hunk position (0-based) plus evidence for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub position: usize,
    pub quality: MatchQuality,
    /// Cumulative per-line score at `position`.
    pub score: f32,
    /// Maximum achievable score (= number of search lines).
    pub max_score: f32,
    /// Human-readable detail for fallback locations: how close the nearest
    /// rejected candidate was.
    pub note: Option<String>,
}

impl Location {
    /// True unless this is a below-threshold fallback.
    pub fn is_confident(&self) -> bool {
        self.quality != MatchQuality::Fallback
    }
}

/// Locate the best position for `hunk` within `file_lines`.
///
/// Search lines are the hunk's Context + Removed text; Added lines are
/// excluded because they do not exist in the old file. An exact match at
/// the declared position short-circuits, as does a perfect-score window
/// candidate. Ties between equal scores favor the offset closer to the
/// expected start.
pub fn locate(file_lines: &[String], hunk: &Hunk) -> Location {
    let search: Vec<&str> = hunk
        .lines
        .iter()
        .filter(|l| l.is_context() || l.is_removed())
        .map(|l| l.text())
        .collect();

    let expected = hunk.old_start.saturating_sub(1);

    if search.is_empty() {
        // Pure insertion: nothing to verify, insert at the declared spot
        // (clamped to the file).
        return Location {
            position: expected.min(file_lines.len()),
            quality: MatchQuality::Exact,
            score: 0.0,
            max_score: 0.0,
            note: None,
        };
    }

    let max_score = search.len() as f32;
    let mut best_score = 0.0f32;

    if file_lines.len() >= search.len() {
        let last_valid = file_lines.len() - search.len();

        if expected <= last_valid && score_at(file_lines, &search, expected) >= max_score {
            return Location {
                position: expected,
                quality: MatchQuality::Exact,
                score: max_score,
                max_score,
                note: None,
            };
        }

        let mut best_pos = None;

        // Offsets iterate from 0 outward so an equal score closer to the
        // expected position wins the tie.
        'search: for offset in 0..=SEARCH_WINDOW {
            let forward = expected.checked_add(offset).filter(|p| *p <= last_valid);
            let backward = if offset == 0 {
                None
            } else {
                expected.checked_sub(offset).filter(|p| *p <= last_valid)
            };

            for pos in forward.into_iter().chain(backward) {
                let score = score_at(file_lines, &search, pos);
                if score > best_score {
                    best_score = score;
                    best_pos = Some(pos);
                    if score >= max_score {
                        break 'search;
                    }
                }
            }
        }

        if let Some(pos) = best_pos {
            if best_score >= ACCEPT_RATIO * max_score {
                let quality = if best_score >= max_score && pos == expected {
                    MatchQuality::Exact
                } else {
                    MatchQuality::Fuzzy
                };
                return Location {
                    position: pos,
                    quality,
                    score: best_score,
                    max_score,
                    note: None,
                };
            }
        }
    }

    // Below threshold: the best score found (possibly zero) is still
    // reported so diagnostics show how close the nearest miss was.
    Location {
        position: expected.min(file_lines.len()),
        quality: MatchQuality::Fallback,
        score: best_score,
        max_score,
        note: Some(nearest_note(file_lines, &search, expected)),
    }
}

/// Cumulative per-line score for aligning `search` at `pos`.
fn score_at(file_lines: &[String], search: &[&str], pos: usize) -> f32 {
    let mut score = 0.0;
    for (i, pattern) in search.iter().enumerate() {
        let Some(actual) = file_lines.get(pos + i) else {
            break;
        };
        if actual == pattern {
            score += SCORE_EXACT;
        } else if actual.trim() == pattern.trim() {
            score += SCORE_TRIMMED;
        }
    }
    score
}

/// Describe the closest rejected candidate for diagnostics, using a
/// character-level similarity so near-misses read as "93% similar" rather
/// than a flat zero.
fn nearest_note(file_lines: &[String], search: &[&str], expected: usize) -> String {
    if file_lines.len() < search.len() {
        return format!(
            "file has {} lines, hunk expects at least {}",
            file_lines.len(),
            search.len()
        );
    }

    let pattern = search.join("\n");
    let lo = expected.saturating_sub(SEARCH_WINDOW);
    let hi = (expected + SEARCH_WINDOW).min(file_lines.len() - search.len());

    let mut best = 0.0f64;
    let mut best_pos = expected.min(file_lines.len() - search.len());
    for pos in lo..=hi {
        let window = file_lines[pos..pos + search.len()].join("\n");
        let sim = strsim::normalized_levenshtein(&pattern, &window);
        if sim > best {
            best = sim;
            best_pos = pos;
        }
    }

    format!(
        "nearest candidate at line {} is {:.0}% similar (threshold not met)",
        best_pos + 1,
        best * 100.0
    )
}
