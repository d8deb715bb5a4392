//! Line-oriented diffs between two content snapshots.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::error::{Result, StreamError};

/// How a line relates the previous content to the current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineTag {
    /// Present on both sides.
    Equal,
    /// Only in the current content.
    Insert,
    /// Only in the previous content.
    Delete,
}

/// One line of a diff, including its original line terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub tag: LineTag,
    pub line: String,
}

impl DiffLine {
    pub fn equal(line: impl Into<String>) -> Self {
        Self {
            tag: LineTag::Equal,
            line: line.into(),
        }
    }

    pub fn insert(line: impl Into<String>) -> Self {
        Self {
            tag: LineTag::Insert,
            line: line.into(),
        }
    }

    pub fn delete(line: impl Into<String>) -> Self {
        Self {
            tag: LineTag::Delete,
            line: line.into(),
        }
    }
}

/// Compute the line diff turning `previous` into `current`.
///
/// Identical inputs yield an empty sequence, which callers use as the
/// "nothing changed" signal. Line endings and whitespace are compared as-is.
pub fn diff(previous: &str, current: &str) -> Vec<DiffLine> {
    if previous == current {
        return Vec::new();
    }

    TextDiff::from_lines(previous, current)
        .iter_all_changes()
        .map(|change| DiffLine {
            tag: match change.tag() {
                ChangeTag::Equal => LineTag::Equal,
                ChangeTag::Insert => LineTag::Insert,
                ChangeTag::Delete => LineTag::Delete,
            },
            line: change.value().to_string(),
        })
        .collect()
}

/// Apply a diff produced by [`diff`] to `previous`, rebuilding the current
/// content. An empty diff leaves `previous` unchanged.
pub fn apply(previous: &str, lines: &[DiffLine]) -> Result<String> {
    if lines.is_empty() {
        return Ok(previous.to_string());
    }

    let mut rest = previous;
    let mut line_no = 0;
    let mut out = String::with_capacity(previous.len());

    for op in lines {
        match op.tag {
            LineTag::Insert => out.push_str(&op.line),
            LineTag::Equal | LineTag::Delete => {
                line_no += 1;
                let Some(remaining) = rest.strip_prefix(op.line.as_str()) else {
                    return Err(StreamError::PatchMismatch {
                        line: line_no,
                        reason: format!("expected {:?}", op.line),
                    });
                };
                if op.tag == LineTag::Equal {
                    out.push_str(&op.line);
                }
                rest = remaining;
            }
        }
    }

    if !rest.is_empty() {
        return Err(StreamError::PatchMismatch {
            line: line_no + 1,
            reason: "diff does not cover all previous lines".to_string(),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_empty_vs_empty() {
        assert!(diff("", "").is_empty());
    }

    #[test]
    fn test_identical_content_is_no_change() {
        assert!(diff("a\nb\n", "a\nb\n").is_empty());
    }

    #[test]
    fn test_new_file() {
        assert_eq!(diff("", "x=1"), vec![DiffLine::insert("x=1")]);
    }

    #[test]
    fn test_changed_line() {
        assert_eq!(
            diff("x=1", "x=2"),
            vec![DiffLine::delete("x=1"), DiffLine::insert("x=2")]
        );
    }

    #[test]
    fn test_keeps_unchanged_lines_in_order() {
        let lines = diff("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(
            lines,
            vec![
                DiffLine::equal("a\n"),
                DiffLine::delete("b\n"),
                DiffLine::insert("B\n"),
                DiffLine::equal("c\n"),
            ]
        );
    }

    #[test]
    fn test_trailing_whitespace_is_significant() {
        let lines = diff("a\n", "a \n");
        assert_eq!(lines, vec![DiffLine::delete("a\n"), DiffLine::insert("a \n")]);
    }

    #[test]
    fn test_apply_rejects_foreign_diff() {
        let lines = diff("a\nb\n", "a\nc\n");
        assert!(matches!(
            apply("z\nb\n", &lines),
            Err(StreamError::PatchMismatch { line: 1, .. })
        ));
    }

    fn content() -> impl Strategy<Value = String> {
        (
            proptest::collection::vec("[ab \\r]{0,3}", 0..8),
            any::<bool>(),
        )
            .prop_map(|(lines, trailing)| {
                let mut text = lines.join("\n");
                if trailing && !text.is_empty() {
                    text.push('\n');
                }
                text
            })
    }

    proptest! {
        #[test]
        fn prop_apply_reconstructs_current(previous in content(), current in content()) {
            let lines = diff(&previous, &current);
            prop_assert_eq!(apply(&previous, &lines).unwrap(), current);
        }

        #[test]
        fn prop_diff_is_deterministic(previous in content(), current in content()) {
            prop_assert_eq!(diff(&previous, &current), diff(&previous, &current));
        }
    }
}
