//! Conflict resolution helpers.
//!
//! The server only ever accepts a final flattened text. [`compose`] is a
//! drafting aid that turns the annotated merge output plus one choice per
//! conflict hunk into such a text.

use serde::{Deserialize, Serialize};

use crate::errors::PullRequestError;
use crate::merge::{join_lines, ConflictHunk, MergeResult, Merger};

/// How to resolve one conflict hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "choice", content = "text")]
pub enum HunkChoice {
    Source,
    Base,
    Target,
    /// Replace the hunk with this text (split on `\n`, empty means no lines).
    Custom(String),
}

impl HunkChoice {
    fn lines<'a>(&'a self, hunk: &'a ConflictHunk) -> Vec<&'a str> {
        match self {
            Self::Source => hunk.source_lines.iter().map(String::as_str).collect(),
            Self::Base => hunk.base_lines.iter().map(String::as_str).collect(),
            Self::Target => hunk.target_lines.iter().map(String::as_str).collect(),
            Self::Custom(text) => crate::merge::split_lines(text),
        }
    }
}

/// Reject empty or whitespace-only resolved content.
pub fn validate_resolved_content(content: &str) -> Result<(), PullRequestError> {
    if content.trim().is_empty() {
        return Err(PullRequestError::Validation(
            "resolved content must be a non-empty string".into(),
        ));
    }
    Ok(())
}

/// Build a draft resolution from a conflicted merge.
///
/// `result` must come from `merger` so the marker lines match. `choices`
/// holds one entry per conflict hunk, in document order.
pub fn compose(
    merger: &Merger,
    result: &MergeResult,
    choices: &[HunkChoice],
) -> Result<String, PullRequestError> {
    if choices.len() != result.conflicts.len() {
        return Err(PullRequestError::Validation(format!(
            "expected {} hunk choice(s), got {}",
            result.conflicts.len(),
            choices.len()
        )));
    }

    let lines = &result.merged_lines;
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut pos = 0;
    for (hunk, choice) in result.conflicts.iter().zip(choices) {
        let block = merger.marker_block(hunk);
        let offset = find_block(&lines[pos..], &block).ok_or_else(|| {
            PullRequestError::Validation("merge output does not contain the conflict markers".into())
        })?;
        out.extend(lines[pos..pos + offset].iter().map(String::as_str));
        out.extend(choice.lines(hunk));
        pos += offset + block.len();
    }
    out.extend(lines[pos..].iter().map(String::as_str));

    Ok(join_lines(&out))
}

fn find_block(haystack: &[String], block: &[String]) -> Option<usize> {
    if block.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - block.len()).find(|&i| haystack[i..i + block.len()] == *block)
}
