//! Three-way merge engine.
//!
//! Aligns `base` against the incoming `source` and the live `target`, groups
//! the resulting change hunks into regions, and classifies every region as
//! unchanged, one-sided, convergent, or conflicting.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::align::{diff_hunks, Hunk};
use super::{join_lines, split_lines};

/// A region where source and target both diverged from base in different
/// ways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictHunk {
    pub source_lines: Vec<String>,
    pub base_lines: Vec<String>,
    pub target_lines: Vec<String>,
}

/// The result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Merged lines. When `conflicts` is non-empty this contains marker
    /// blocks and must not be stored as document content.
    pub merged_lines: Vec<String>,
    /// Conflict hunks in document order.
    pub conflicts: Vec<ConflictHunk>,
}

/// Tagged form of a [`MergeResult`] so callers never have to inspect the
/// conflict list to know whether the lines are authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean(Vec<String>),
    Conflicted {
        annotated: Vec<String>,
        hunks: Vec<ConflictHunk>,
    },
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// The merged lines joined back into text.
    pub fn merged_text(&self) -> String {
        join_lines(&self.merged_lines)
    }

    pub fn into_outcome(self) -> MergeOutcome {
        if self.conflicts.is_empty() {
            MergeOutcome::Clean(self.merged_lines)
        } else {
            MergeOutcome::Conflicted {
                annotated: self.merged_lines,
                hunks: self.conflicts,
            }
        }
    }
}

/// Labels written after the conflict marker sigils.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLabels {
    pub source: String,
    pub base: String,
    pub target: String,
}

impl Default for MarkerLabels {
    fn default() -> Self {
        Self {
            source: "source".into(),
            base: "base".into(),
            target: "target".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy)]
struct SidedHunk {
    side: Side,
    hunk: Hunk,
}

/// Stateless three-way merge engine, parameterized only by marker labels.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    labels: MarkerLabels,
}

impl Merger {
    pub fn new(labels: MarkerLabels) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &MarkerLabels {
        &self.labels
    }

    /// Merge `source` into `target`, both descended from `base`.
    ///
    /// Total and deterministic: identical inputs always give identical
    /// merged lines and the same conflict ordering.
    pub fn merge<S: AsRef<str>>(&self, base: &[S], target: &[S], source: &[S]) -> MergeResult {
        let base: Vec<&str> = base.iter().map(AsRef::as_ref).collect();
        let target: Vec<&str> = target.iter().map(AsRef::as_ref).collect();
        let source: Vec<&str> = source.iter().map(AsRef::as_ref).collect();

        let mut hunks: Vec<SidedHunk> = diff_hunks(&base, &source)
            .into_iter()
            .map(|hunk| SidedHunk {
                side: Side::Source,
                hunk,
            })
            .chain(diff_hunks(&base, &target).into_iter().map(|hunk| SidedHunk {
                side: Side::Target,
                hunk,
            }))
            .collect();
        hunks.sort_by_key(|h| (h.hunk.base_start, h.side, h.hunk.base_end));

        let mut merged_lines: Vec<String> = Vec::new();
        let mut conflicts = Vec::new();
        let mut base_pos = 0;
        let mut regions = 0usize;

        let mut i = 0;
        while i < hunks.len() {
            let region_start = hunks[i].hunk.base_start;
            let mut region_end = hunks[i].hunk.base_end;
            let mut j = i + 1;
            while j < hunks.len() && joins_region(&hunks[i..j], region_end, &hunks[j].hunk) {
                region_end = region_end.max(hunks[j].hunk.base_end);
                j += 1;
            }
            let region = &hunks[i..j];
            regions += 1;

            push_lines(&mut merged_lines, &base[base_pos..region_start]);

            let base_lines = &base[region_start..region_end];
            let source_lines = side_lines(region, Side::Source, &source, base_lines, region_start, region_end);
            let target_lines = side_lines(region, Side::Target, &target, base_lines, region_start, region_end);

            if source_lines == base_lines {
                push_lines(&mut merged_lines, target_lines);
            } else if target_lines == base_lines || source_lines == target_lines {
                push_lines(&mut merged_lines, source_lines);
            } else {
                let hunk = ConflictHunk {
                    source_lines: to_owned(source_lines),
                    base_lines: to_owned(base_lines),
                    target_lines: to_owned(target_lines),
                };
                self.push_markers(&mut merged_lines, &hunk);
                conflicts.push(hunk);
            }

            base_pos = region_end;
            i = j;
        }
        push_lines(&mut merged_lines, &base[base_pos..]);

        debug!(
            regions,
            conflicts = conflicts.len(),
            merged_lines = merged_lines.len(),
            "three-way merge computed"
        );

        MergeResult {
            merged_lines,
            conflicts,
        }
    }

    /// Merge whole texts; see [`split_lines`] for how text maps to lines.
    pub fn merge_text(&self, base: &str, target: &str, source: &str) -> MergeResult {
        self.merge(&split_lines(base), &split_lines(target), &split_lines(source))
    }

    /// Quick check: would merging these texts complete without conflicts?
    pub fn can_auto_merge(base: &str, target: &str, source: &str) -> bool {
        if source == base || target == base || source == target {
            return true;
        }
        !Merger::default()
            .merge_text(base, target, source)
            .has_conflicts()
    }

    /// The annotated lines written in place of `hunk`.
    pub fn marker_block(&self, hunk: &ConflictHunk) -> Vec<String> {
        let mut out = Vec::with_capacity(
            hunk.source_lines.len() + hunk.base_lines.len() + hunk.target_lines.len() + 4,
        );
        self.push_markers(&mut out, hunk);
        out
    }

    fn push_markers(&self, out: &mut Vec<String>, hunk: &ConflictHunk) {
        out.push(format!("<<<<<<< {}", self.labels.source));
        out.extend(hunk.source_lines.iter().cloned());
        out.push(format!("||||||| {}", self.labels.base));
        out.extend(hunk.base_lines.iter().cloned());
        out.push("=======".to_string());
        out.extend(hunk.target_lines.iter().cloned());
        out.push(format!(">>>>>>> {}", self.labels.target));
    }
}

/// Whether `next` belongs to the region formed by `region` hunks.
///
/// Overlapping base ranges always join. Ranges that only touch join when an
/// insertion sits on the shared boundary, since the insertion's position
/// relative to the other side's change is ambiguous. Two non-empty changes
/// meeting end-to-start stay separate.
fn joins_region(region: &[SidedHunk], region_end: usize, next: &Hunk) -> bool {
    if next.base_start < region_end {
        return true;
    }
    if next.base_start > region_end {
        return false;
    }
    next.is_insertion()
        || region
            .iter()
            .any(|h| h.hunk.is_insertion() && h.hunk.base_start == region_end)
}

/// The lines one side holds for `base[region_start..region_end]`.
fn side_lines<'a>(
    region: &[SidedHunk],
    side: Side,
    lines: &'a [&'a str],
    base_lines: &'a [&'a str],
    region_start: usize,
    region_end: usize,
) -> &'a [&'a str] {
    let mut own = region.iter().filter(|h| h.side == side).map(|h| h.hunk);
    let Some(first) = own.next() else {
        return base_lines;
    };
    let last = own.last().unwrap_or(first);

    // Base lines inside the region but outside this side's hunks are
    // unchanged on this side, so they extend the range one-for-one.
    let start = first.side_start - (first.base_start - region_start);
    let end = last.side_end + (region_end - last.base_end);
    &lines[start..end]
}

fn push_lines(out: &mut Vec<String>, lines: &[&str]) {
    out.extend(lines.iter().map(|l| l.to_string()));
}

fn to_owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}
