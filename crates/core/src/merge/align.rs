//! Line alignment between a base document and one edited side.
//!
//! The alignment is a longest-common-subsequence matching over whole lines.
//! Common leading and trailing lines are matched up front so the quadratic
//! table only covers the region that actually changed.

use std::iter;

/// A maximal change turning `base[base_start..base_end]` into
/// `side[side_start..side_end]`.
///
/// Either range may be empty: an empty base range is a pure insertion, an
/// empty side range is a pure deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hunk {
    pub base_start: usize,
    pub base_end: usize,
    pub side_start: usize,
    pub side_end: usize,
}

impl Hunk {
    /// True when the hunk adds lines without consuming any base line.
    pub fn is_insertion(&self) -> bool {
        self.base_start == self.base_end
    }
}

/// Compute the change hunks between `base` and `side`, ordered by position.
pub(crate) fn diff_hunks(base: &[&str], side: &[&str]) -> Vec<Hunk> {
    let pairs = matched_pairs(base, side);

    let mut hunks = Vec::new();
    let (mut base_pos, mut side_pos) = (0, 0);
    for (b, s) in pairs
        .into_iter()
        .chain(iter::once((base.len(), side.len())))
    {
        if b > base_pos || s > side_pos {
            hunks.push(Hunk {
                base_start: base_pos,
                base_end: b,
                side_start: side_pos,
                side_end: s,
            });
        }
        base_pos = b + 1;
        side_pos = s + 1;
    }
    hunks
}

/// Index pairs `(i, j)` with `a[i] == b[j]`, strictly increasing in both
/// coordinates, forming a longest common subsequence.
pub(crate) fn matched_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());

    let mut prefix = 0;
    while prefix < n && prefix < m && a[prefix] == b[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < n - prefix && suffix < m - prefix && a[n - 1 - suffix] == b[m - 1 - suffix] {
        suffix += 1;
    }

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();
    let middle = lcs_pairs(&a[prefix..n - suffix], &b[prefix..m - suffix]);
    pairs.extend(middle.into_iter().map(|(i, j)| (i + prefix, j + prefix)));
    pairs.extend((0..suffix).map(|k| (n - suffix + k, m - suffix + k)));
    pairs
}

/// Classic dynamic-programming LCS. `table[i][j]` holds the LCS length of
/// `a[i..]` and `b[j..]`; the walk prefers advancing in `a` on ties so the
/// result is fully determined by the inputs.
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_sequences_have_no_hunks() {
        let lines = ["a", "b", "c"];
        assert!(diff_hunks(&lines, &lines).is_empty());
        assert_eq!(matched_pairs(&lines, &lines), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_single_line_change() {
        let hunks = diff_hunks(&["a", "b", "c"], &["a", "x", "c"]);
        assert_eq!(
            hunks,
            vec![Hunk {
                base_start: 1,
                base_end: 2,
                side_start: 1,
                side_end: 2,
            }]
        );
    }

    #[test]
    fn test_insertion_and_deletion() {
        let hunks = diff_hunks(&["a", "b", "c"], &["a", "n", "b"]);
        assert_eq!(hunks.len(), 2);
        assert!(hunks[0].is_insertion());
        assert_eq!((hunks[0].base_start, hunks[0].side_start, hunks[0].side_end), (1, 1, 2));
        assert_eq!((hunks[1].base_start, hunks[1].base_end), (2, 3));
        assert_eq!(hunks[1].side_start, hunks[1].side_end);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(diff_hunks(&[], &[]).is_empty());

        let added = diff_hunks(&[], &["x", "y"]);
        assert_eq!(
            added,
            vec![Hunk {
                base_start: 0,
                base_end: 0,
                side_start: 0,
                side_end: 2,
            }]
        );

        let removed = diff_hunks(&["x", "y"], &[]);
        assert_eq!(removed[0].base_end, 2);
        assert_eq!(removed[0].side_end, 0);
    }

    #[test]
    fn test_lcs_finds_longest_run() {
        let a = ["x", "a", "b", "c", "y"];
        let b = ["a", "b", "z", "c"];
        let pairs = matched_pairs(&a, &b);
        assert_eq!(pairs, vec![(1, 0), (2, 1), (3, 3)]);
    }

    #[test]
    fn test_repeated_lines_are_deterministic() {
        let a = ["", "x", "", "x", ""];
        let b = ["x", "", "", "x"];
        assert_eq!(matched_pairs(&a, &b), matched_pairs(&a, &b));
        assert_eq!(diff_hunks(&a, &b), diff_hunks(&a, &b));
    }
}
