//! Unified-diff reconciliation primitives: parse, anchor, locate, apply.

pub mod apply;
pub mod header;
pub mod locate;
pub mod parser;

pub use apply::{apply_hunk, Applied};
pub use header::{synthesize, SynthesisOutcome};
pub use locate::{locate, Location, MatchQuality, SEARCH_WINDOW};
pub use parser::{FilePatch, Hunk, HunkLine, Patch};
