//! Line-level text diff: Myers edit scripts as hunks, exact re-application, unified rendering

use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag, capture_diff_slices};

use crate::error::DiffError;

/// A contiguous line-range edit.
///
/// Lines keep their terminators, so a missing trailing newline survives a
/// diff/apply round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// 1-based line in the old content where the hunk begins.
    pub start_line: usize,
    pub removed_lines: Vec<String>,
    pub added_lines: Vec<String>,
}

/// Computes, applies and renders line diffs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine
    }

    /// Minimal edit script turning `old` into `new`.
    pub fn diff(&self, old: &str, new: &str) -> Vec<Hunk> {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

        let mut hunks: Vec<Hunk> = Vec::new();
        for op in ops {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                continue;
            }
            let removed = old_lines[old_range.clone()].iter().map(|l| l.to_string());
            let added = new_lines[new_range].iter().map(|l| l.to_string());

            // Adjacent delete/insert ops share one hunk.
            match hunks.last_mut() {
                Some(last) if last.start_line - 1 + last.removed_lines.len() == old_range.start => {
                    last.removed_lines.extend(removed);
                    last.added_lines.extend(added);
                }
                _ => hunks.push(Hunk {
                    start_line: old_range.start + 1,
                    removed_lines: removed.collect(),
                    added_lines: added.collect(),
                }),
            }
        }
        hunks
    }

    /// Apply hunks produced against `content`. `apply(old, diff(old, new)) == new`.
    pub fn apply(&self, content: &str, hunks: &[Hunk]) -> Result<String, DiffError> {
        let lines = split_lines(content);
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;

        for (i, hunk) in hunks.iter().enumerate() {
            let start = hunk.start_line.checked_sub(1).ok_or(DiffError::OutOfRange {
                hunk: i,
                start: hunk.start_line,
                len: lines.len(),
            })?;
            if start < cursor {
                return Err(DiffError::Overlap { hunk: i });
            }
            let end = start + hunk.removed_lines.len();
            if end > lines.len() {
                return Err(DiffError::OutOfRange {
                    hunk: i,
                    start: hunk.start_line,
                    len: lines.len(),
                });
            }
            for (offset, expected) in hunk.removed_lines.iter().enumerate() {
                if lines[start + offset] != expected.as_str() {
                    return Err(DiffError::Mismatch {
                        hunk: i,
                        line: start + offset + 1,
                    });
                }
            }

            lines[cursor..start].iter().for_each(|l| out.push_str(l));
            hunk.added_lines.iter().for_each(|l| out.push_str(l));
            cursor = end;
        }
        lines[cursor..].iter().for_each(|l| out.push_str(l));

        Ok(out)
    }

    /// Unified-diff hunk bodies (no file headers, no context lines).
    pub fn render(&self, hunks: &[Hunk]) -> String {
        let mut out = String::new();
        let mut offset: isize = 0;

        for hunk in hunks {
            let removed = hunk.removed_lines.len();
            let added = hunk.added_lines.len();
            let new_start = (hunk.start_line as isize + offset) as usize;
            out.push_str(&format!(
                "@@ -{} +{} @@\n",
                range_header(hunk.start_line, removed),
                range_header(new_start, added)
            ));
            for line in &hunk.removed_lines {
                push_line(&mut out, '-', line);
            }
            for line in &hunk.added_lines {
                push_line(&mut out, '+', line);
            }
            offset += added as isize - removed as isize;
        }
        out
    }

    /// `render` with `---`/`+++` headers.
    pub fn render_file(&self, old_path: &str, new_path: &str, hunks: &[Hunk]) -> String {
        if hunks.is_empty() {
            return String::new();
        }
        format!("--- {old_path}\n+++ {new_path}\n{}", self.render(hunks))
    }
}

/// Split into lines, keeping terminators. Empty content has no lines.
fn split_lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

/// `start,len` in unified notation; an empty range points at the line before.
fn range_header(start: usize, len: usize) -> String {
    match len {
        0 => format!("{},0", start.saturating_sub(1)),
        1 => format!("{start}"),
        n => format!("{start},{n}"),
    }
}

fn push_line(out: &mut String, marker: char, line: &str) {
    out.push(marker);
    match line.strip_suffix('\n') {
        Some(body) => {
            out.push_str(body);
            out.push('\n');
        }
        None => {
            out.push_str(line);
            out.push_str("\n\\ No newline at end of file\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &str, new: &str) {
        let engine = DiffEngine::new();
        let hunks = engine.diff(old, new);
        assert_eq!(engine.apply(old, &hunks).unwrap(), new, "old={old:?} new={new:?}");
    }

    #[test]
    fn test_apply_inverts_diff_on_edge_cases() {
        let cases = [
            ("", ""),
            ("", "a\n"),
            ("a\n", ""),
            ("a", "a\n"),
            ("a\n", "a"),
            ("single line", "single line changed"),
            ("a\nb\nc\n", "a\nc\n"),
            ("a\nb\nc\n", "x\na\nb\nc\ny"),
            ("one\ntwo\nthree\nfour\n", "one\n2\nthree\n4\nfive\n"),
            ("\n\n\n", "\n"),
            ("a\r\nb\r\n", "a\r\nc\r\n"),
        ];
        for (old, new) in cases {
            roundtrip(old, new);
        }
    }

    #[test]
    fn test_identical_content_has_no_hunks() {
        let engine = DiffEngine::new();
        assert!(engine.diff("same\ntext\n", "same\ntext\n").is_empty());
        assert!(engine.diff("", "").is_empty());
    }

    #[test]
    fn test_adjacent_changes_merge_into_one_hunk() {
        let engine = DiffEngine::new();
        let hunks = engine.diff("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].start_line, 2);
        assert_eq!(hunks[0].removed_lines, vec!["b\n"]);
        assert_eq!(hunks[0].added_lines, vec!["B\n"]);
    }

    #[test]
    fn test_apply_rejects_stale_hunks() {
        let engine = DiffEngine::new();
        let hunks = engine.diff("a\nb\n", "a\nc\n");
        assert_eq!(
            engine.apply("a\nzzz\n", &hunks),
            Err(DiffError::Mismatch { hunk: 0, line: 2 })
        );
        assert!(matches!(engine.apply("a\n", &hunks), Err(DiffError::OutOfRange { .. })));
    }

    #[test]
    fn test_apply_rejects_overlapping_hunks() {
        let engine = DiffEngine::new();
        let hunk = Hunk {
            start_line: 1,
            removed_lines: vec!["a\n".into()],
            added_lines: vec![],
        };
        let result = engine.apply("a\nb\n", &[hunk.clone(), hunk]);
        assert_eq!(result, Err(DiffError::Overlap { hunk: 1 }));
    }

    #[test]
    fn test_render_unified() {
        let engine = DiffEngine::new();
        let hunks = engine.diff("a\nb\nc\nd\n", "a\nB\nc\nd\ne\n");
        insta::assert_snapshot!(engine.render(&hunks), @r"
        @@ -2 +2 @@
        -b
        +B
        @@ -4,0 +5 @@
        +e
        ");
    }

    #[test]
    fn test_render_marks_missing_newline() {
        let engine = DiffEngine::new();
        let hunks = engine.diff("a\n", "a\nb");
        let text = engine.render_file("a/x.txt", "b/x.txt", &hunks);
        assert!(text.starts_with("--- a/x.txt\n+++ b/x.txt\n"));
        assert!(text.contains("+b\n\\ No newline at end of file\n"));
    }
}
