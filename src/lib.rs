//! Diffmend: Patch reconciliation for machine-generated diffs
//!
//! A lenient unified-diff pipeline that accepts the slightly-wrong
//! patches code generators emit — drifted line numbers, bare `@@`
//! headers, missing prefixes — and lands them anyway when the intent is
//! unambiguous.
//!
//! # Architecture
//!
//! Application runs as a bounded escalation ladder driven by
//! [`EscalationController`]:
//!
//! 1. **Standard** — the native apply tool with whitespace tolerance.
//! 2. **Fuzzy** — in-process parse, header synthesis, windowed
//!    relocation, and cursor-walk application via [`reconcile`].
//! 3. **Regenerate** — a fresh patch from the generator collaborator,
//!    retried through the standard logic.
//!
//! The fuzzy tier is built from small stages: [`Patch::parse`] never
//! fails on well-delimited input, [`synthesize`] recovers missing hunk
//! headers by anchoring on content, [`locate`] searches a bounded window
//! around the declared position, and [`apply_hunk`] trusts the file over
//! the patch for context lines.
//!
//! # Safety
//!
//! - Workspace boundary enforcement on every patched path
//! - Atomic file writes (tempfile + fsync + rename)
//! - Content hashing detects concurrent modification between read and write
//! - All-or-nothing per patch: a rejected hunk writes nothing

pub mod diff;
pub mod engine;
pub mod safety;
pub mod store;
pub mod validate;

// Re-exports
pub use diff::{
    apply_hunk, locate, synthesize, Applied, FilePatch, Hunk, HunkLine, Location, MatchQuality,
    Patch, SynthesisOutcome, SEARCH_WINDOW,
};
pub use engine::{
    reconcile, AttemptRecord, EscalationController, FixReport, FuzzyError, FuzzyReport,
    GenerateError, GitApply, NativeApply, NativeOutcome, PatchGenerator, RegenerateRequest,
    Strategy,
};
pub use safety::{SafetyError, WorkspaceGuard};
pub use store::{DiskStore, FileStore, MemStore, StoreError};
pub use validate::{validate_format, FormatError};
