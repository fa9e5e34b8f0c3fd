//! Line and word level differences between plain-text projections.
//!
//! - [`compute_diff`]: ordered line diff (LCS) for the split/unified viewers
//! - [`word_set_diff`]: order-insensitive word stats stored on snapshots
//! - [`word_count`]: word counting with per-character CJK counting
//!
//! # Example
//!
//! ```ignore
//! use nexusnote_core::diff::{compute_diff, DiffLineKind};
//!
//! let lines = compute_diff("a\nb\nc", "a\nx\nc");
//! assert_eq!(lines[1].kind, DiffLineKind::Removed);
//! assert_eq!(lines[2].kind, DiffLineKind::Added);
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::crdt::DiffStats;

/// How a line changed between two texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DiffLineKind {
    Unchanged,
    Added,
    Removed,
}

/// One line of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DiffLine {
    pub kind: DiffLineKind,

    /// Line content without the trailing newline
    pub content: String,

    /// 1-based line number in the older text (absent for added lines)
    pub before_line: Option<usize>,

    /// 1-based line number in the newer text (absent for removed lines)
    pub after_line: Option<usize>,
}

/// Line counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Whether the two texts differ at all.
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Compute the line diff between `before` and `after`.
///
/// Lines on the longest common subsequence are `Unchanged`. Between two
/// common lines, removed lines are emitted before added lines. An empty
/// text has no lines.
pub fn compute_diff(before: &str, after: &str) -> Vec<DiffLine> {
    let old = split_lines(before);
    let new = split_lines(after);
    let (n, m) = (old.len(), new.len());

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(n.max(m));
    let mut added = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            lines.append(&mut added);
            lines.push(DiffLine {
                kind: DiffLineKind::Unchanged,
                content: old[i].to_string(),
                before_line: Some(i + 1),
                after_line: Some(j + 1),
            });
            i += 1;
            j += 1;
            continue;
        }

        // Ties are broken on line content so that swapping the inputs
        // mirrors the path through the table.
        let skip_old = j == m
            || (i < n
                && match lcs[i + 1][j].cmp(&lcs[i][j + 1]) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => old[i] < new[j],
                });
        if skip_old {
            lines.push(DiffLine {
                kind: DiffLineKind::Removed,
                content: old[i].to_string(),
                before_line: Some(i + 1),
                after_line: None,
            });
            i += 1;
        } else {
            added.push(DiffLine {
                kind: DiffLineKind::Added,
                content: new[j].to_string(),
                before_line: None,
                after_line: Some(j + 1),
            });
            j += 1;
        }
    }
    lines.append(&mut added);
    lines
}

/// Count lines per kind.
pub fn summarize(lines: &[DiffLine]) -> DiffSummary {
    lines
        .iter()
        .fold(DiffSummary::default(), |mut summary, line| {
            match line.kind {
                DiffLineKind::Unchanged => summary.unchanged += 1,
                DiffLineKind::Added => summary.added += 1,
                DiffLineKind::Removed => summary.removed += 1,
            }
            summary
        })
}

/// Render a diff with `+`, `-` and ` ` line prefixes.
pub fn to_unified(lines: &[DiffLine]) -> String {
    let mut out = String::new();
    for line in lines {
        let prefix = match line.kind {
            DiffLineKind::Unchanged => ' ',
            DiffLineKind::Added => '+',
            DiffLineKind::Removed => '-',
        };
        out.push(prefix);
        out.push_str(&line.content);
        out.push('\n');
    }
    out
}

/// Whether `c` is counted as a word on its own (Han, kana, hangul).
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x309F        // Hiragana
        | 0x30A0..=0x30FF      // Katakana
        | 0x3400..=0x4DBF      // CJK Extension A
        | 0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0xF900..=0xFAFF      // CJK Compatibility Ideographs
        | 0x1100..=0x11FF      // Hangul Jamo
        | 0x3130..=0x318F      // Hangul Compatibility Jamo
        | 0xAC00..=0xD7AF      // Hangul Syllables
        | 0x20000..=0x2A6DF    // CJK Extension B
    )
}

/// Split text into word tokens: each CJK character is a token, everything
/// else is split on whitespace.
fn tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(|c: char| !c.is_whitespace())?;
        rest = &rest[start..];
        let first = rest.chars().next()?;
        let end = if is_cjk(first) {
            first.len_utf8()
        } else {
            rest.find(|c: char| c.is_whitespace() || is_cjk(c))
                .unwrap_or(rest.len())
        };
        let (token, tail) = rest.split_at(end);
        rest = tail;
        Some(token)
    })
}

/// Count words: CJK characters one each, other text per whitespace run.
pub fn word_count(text: &str) -> usize {
    tokens(text).count()
}

/// Word-set difference between two texts.
///
/// `added` counts distinct words present only in `new_text`, `removed`
/// those present only in `old_text`. Reordering contributes nothing.
pub fn word_set_diff(old_text: &str, new_text: &str) -> DiffStats {
    let old: HashSet<&str> = tokens(old_text).collect();
    let new: HashSet<&str> = tokens(new_text).collect();
    DiffStats {
        added: new.difference(&old).count(),
        removed: old.difference(&new).count(),
    }
}
