//! Line-oriented three-way merge.
//!
//! The merge engine is pure: it takes three line sequences (base, the live
//! target, the incoming source) and returns merged lines plus the conflict
//! hunks it could not reconcile. It performs no I/O and holds no state.

mod align;
pub mod merger;

pub use merger::{ConflictHunk, MarkerLabels, MergeOutcome, MergeResult, Merger};

/// Split document text into lines.
///
/// The empty string is a zero-line document. Any other text is split on
/// `\n`, so a trailing newline produces a final empty line and
/// [`join_lines`] restores the original text exactly.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Inverse of [`split_lines`].
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}
