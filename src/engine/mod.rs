//! Escalation controller: the bounded retry ladder over apply strategies.
//!
//! Three tiers, strictly forward, never retracting:
//!
//! 1. **Standard** — the native exact-context apply tool, whitespace
//!    tolerance on.
//! 2. **Fuzzy** — the in-process parse/synthesize/locate/apply pipeline,
//!    writing through the file store.
//! 3. **Regenerate** — ask the generator collaborator for fresh patch
//!    text (prior failure attached as feedback) and rerun the standard
//!    logic against it.
//!
//! Success at any tier terminates the ladder immediately. Exhaustion is
//! terminal and carries the full diagnostic trail. The strategy set is a
//! closed tagged variant so "never retract" is a property of the type,
//! not a convention.

pub mod applier;
pub mod native;

pub use applier::{reconcile, FuzzyError, FuzzyReport};
pub use native::{GitApply, NativeApply, NativeOutcome};

use crate::store::FileStore;
use crate::validate::validate_format;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Apply strategy for one attempt. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    Standard,
    Fuzzy,
    Regenerate,
}

impl Strategy {
    /// The next tier, or `None` once the ladder is exhausted.
    pub fn next(self) -> Option<Strategy> {
        match self {
            Strategy::Standard => Some(Strategy::Fuzzy),
            Strategy::Fuzzy => Some(Strategy::Regenerate),
            Strategy::Regenerate => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Strategy::Standard => "standard",
            Strategy::Fuzzy => "fuzzy",
            Strategy::Regenerate => "regenerate",
        }
    }
}

/// One failed attempt, kept for the diagnostic trail.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    pub error: String,
}

/// Terminal result of an apply-fix run, consumed by the surrounding
/// pipeline to decide commit/push or halt.
#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub success: bool,
    pub modified_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Which tier succeeded, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succeeded_at: Option<Strategy>,
    pub attempts: Vec<AttemptRecord>,
    pub warnings: Vec<String>,
}

impl FixReport {
    fn success(strategy: Strategy, modified_files: Vec<String>, attempts: Vec<AttemptRecord>, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            modified_files,
            error: None,
            succeeded_at: Some(strategy),
            attempts,
            warnings,
        }
    }

    fn failure(error: String, attempts: Vec<AttemptRecord>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            modified_files: Vec::new(),
            error: Some(error),
            succeeded_at: None,
            attempts,
            warnings,
        }
    }
}

/// Context handed to the generator when tier 3 requests a fresh patch.
#[derive(Debug, Clone)]
pub struct RegenerateRequest<'a> {
    /// Current content of every file the failing patch names.
    pub file_contents: Vec<(String, String)>,
    /// What the patch was trying to accomplish.
    pub task: &'a str,
    /// The failure that pushed the ladder to tier 3.
    pub prior_failure: &'a str,
}

#[derive(Error, Debug)]
#[error("patch generator failed: {0}")]
pub struct GenerateError(pub String);

/// External patch generator, invoked only at tier 3.
pub trait PatchGenerator {
    fn regenerate(&self, request: &RegenerateRequest<'_>) -> Result<String, GenerateError>;
}

/// Manual-remediation checklist attached to exhaustion failures.
const REMEDIATION_CHECKLIST: &[&str] = &[
    "inspect the patch text for hallucinated context lines",
    "confirm the named files exist at the expected paths",
    "re-read the target files; they may have drifted since the patch was generated",
    "apply the change by hand and record the issue as needing manual follow-up",
];

/// Orchestrates the three-tier ladder.
pub struct EscalationController<'a> {
    native: &'a dyn NativeApply,
    generator: Option<&'a dyn PatchGenerator>,
    cancel: Option<&'a AtomicBool>,
    /// Tier 1 verifies with `check` instead of mutating the tree.
    dry_run: bool,
}

impl<'a> EscalationController<'a> {
    pub fn new(native: &'a dyn NativeApply) -> Self {
        Self {
            native,
            generator: None,
            cancel: None,
            dry_run: false,
        }
    }

    /// Attach the tier-3 generator. Without one the ladder exhausts after
    /// tier 2.
    pub fn with_generator(mut self, generator: &'a dyn PatchGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Cooperative cancellation, observed at tier boundaries only; a hunk
    /// application is a fast in-memory transform and is never interrupted
    /// mid-flight.
    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Run the ladder for one patch against one workspace.
    ///
    /// `task` describes the intent and is forwarded to the generator as
    /// regeneration context.
    pub fn run(
        &self,
        store: &mut dyn FileStore,
        repo_root: &Path,
        patch_text: &str,
        task: &str,
    ) -> FixReport {
        // Structural validation is fatal up front: a malformed patch fails
        // identically on every tier.
        if let Err(e) = validate_format(patch_text) {
            return FixReport::failure(format!("patch rejected: {e}"), Vec::new(), Vec::new());
        }

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut strategy = Strategy::Standard;

        loop {
            if self.cancelled() {
                return FixReport::failure(
                    format!("canceled before {} attempt", strategy.label()),
                    attempts,
                    warnings,
                );
            }

            let outcome = match strategy {
                Strategy::Standard => self.attempt_standard(repo_root, patch_text),
                Strategy::Fuzzy => self.attempt_fuzzy(store, patch_text, &mut warnings),
                Strategy::Regenerate => {
                    self.attempt_regenerate(store, repo_root, patch_text, task, &attempts)
                }
            };

            match outcome {
                AttemptOutcome::Success(modified_files) => {
                    return FixReport::success(strategy, modified_files, attempts, warnings);
                }
                AttemptOutcome::Fatal(error) => {
                    return FixReport::failure(error, attempts, warnings);
                }
                AttemptOutcome::Failed(error) => {
                    attempts.push(AttemptRecord { strategy, error });
                }
            }

            match strategy.next() {
                Some(next) if next != Strategy::Regenerate || self.generator.is_some() => {
                    strategy = next;
                }
                _ => {
                    return FixReport::failure(
                        exhaustion_message(patch_text, &attempts),
                        attempts,
                        warnings,
                    );
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn attempt_standard(&self, repo_root: &Path, patch_text: &str) -> AttemptOutcome {
        let outcome = if self.dry_run {
            self.native.check(repo_root, patch_text)
        } else {
            self.native.apply(repo_root, patch_text)
        };

        if outcome.success {
            let modified = crate::diff::Patch::parse(patch_text)
                .paths()
                .into_iter()
                .map(String::from)
                .collect();
            AttemptOutcome::Success(modified)
        } else {
            AttemptOutcome::Failed(format!("native apply failed: {}", outcome.stderr.trim()))
        }
    }

    fn attempt_fuzzy(
        &self,
        store: &mut dyn FileStore,
        patch_text: &str,
        warnings: &mut Vec<String>,
    ) -> AttemptOutcome {
        match reconcile(store, patch_text) {
            Ok(report) => {
                warnings.extend(report.warnings);
                AttemptOutcome::Success(report.modified_files)
            }
            Err(e) if e.is_fatal() => AttemptOutcome::Fatal(format!("patch rejected: {e}")),
            Err(e) => AttemptOutcome::Failed(format!("fuzzy apply failed: {e}")),
        }
    }

    fn attempt_regenerate(
        &self,
        store: &mut dyn FileStore,
        repo_root: &Path,
        patch_text: &str,
        task: &str,
        attempts: &[AttemptRecord],
    ) -> AttemptOutcome {
        let Some(generator) = self.generator else {
            return AttemptOutcome::Failed("no patch generator configured".to_string());
        };

        let prior_failure = attempts
            .last()
            .map(|a| a.error.clone())
            .unwrap_or_default();

        let mut file_contents = Vec::new();
        for path in crate::diff::Patch::parse(patch_text).paths() {
            match store.read(path) {
                Ok(content) => file_contents.push((path.to_string(), content)),
                Err(e) => {
                    return AttemptOutcome::Failed(format!(
                        "cannot regenerate: failed to read {path}: {e}"
                    ))
                }
            }
        }

        let request = RegenerateRequest {
            file_contents,
            task,
            prior_failure: &prior_failure,
        };

        let fresh = match generator.regenerate(&request) {
            Ok(text) => text,
            Err(e) => return AttemptOutcome::Failed(e.to_string()),
        };

        if let Err(e) = validate_format(&fresh) {
            return AttemptOutcome::Failed(format!("regenerated patch rejected: {e}"));
        }

        // Restart the standard logic against the fresh text; the attempt
        // budget is spent, so its failure is the ladder's failure.
        self.attempt_standard(repo_root, &fresh)
    }
}

enum AttemptOutcome {
    Success(Vec<String>),
    Failed(String),
    Fatal(String),
}

/// Terminal exhaustion message: the literal file list, the last error per
/// tier, and the manual-remediation checklist. Nothing is dropped
/// silently.
fn exhaustion_message(patch_text: &str, attempts: &[AttemptRecord]) -> String {
    let files = crate::diff::Patch::parse(patch_text).paths().join(", ");
    let mut msg = format!("all apply strategies exhausted for: {files}\n");
    for attempt in attempts {
        msg.push_str(&format!("  [{}] {}\n", attempt.strategy.label(), attempt.error));
    }
    msg.push_str("manual remediation:\n");
    for step in REMEDIATION_CHECKLIST {
        msg.push_str(&format!("  - {step}\n"));
    }
    msg
}
