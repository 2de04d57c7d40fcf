//! Unified-diff anchoring helpers.
//!
//! Finds the first newly added line of a single-file diff so an inline
//! comment can be anchored on it when the caller gave no explicit line.
//!
//! - Works on hunks-only input (GitLab `/diffs` returns no `diff --git` header).
//! - Ignores `---`/`+++` file headers and `\ No newline at end of file` markers.
//! - Binary patches never produce an anchor.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use gitlab_api::MrDiffFile;

use crate::errors::ParseError;

lazy_static! {
    static ref HUNK_HEADER: Regex =
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("static hunk header regex");
}

/// First added line (1-based, new file side) of a unified diff.
///
/// Best-effort wrapper over [`scan_first_added_line`]: precondition
/// violations are logged and reported as `None`.
pub fn resolve_first_added_line(diff: &str) -> Option<u32> {
    match scan_first_added_line(diff) {
        Ok(line) => line,
        Err(e) => {
            warn!("diff anchor unavailable: {e}");
            None
        }
    }
}

/// Strict scan for the first added line.
///
/// The `new_line` counter starts at `new_start - 1` on every valid hunk
/// header, moves forward on context and added lines and stays put on removed
/// lines. The first added line returns immediately.
///
/// A header that starts with `@@` but does not parse is skipped with a
/// warning and the previous counter is kept, so a later addition may be
/// anchored on a stale count. An added or context line before any valid
/// header is a precondition violation.
pub fn scan_first_added_line(diff: &str) -> Result<Option<u32>, ParseError> {
    if diff.trim().is_empty() || looks_like_binary_patch(diff) {
        return Ok(None);
    }

    let mut new_line: Option<u32> = None;
    let mut stale = false;

    for (idx, line) in diff.lines().enumerate() {
        if line.starts_with("@@") {
            match parse_new_start(line) {
                Some(start) => {
                    new_line = Some(start.saturating_sub(1));
                    stale = false;
                }
                None => {
                    warn!(line_no = idx + 1, "malformed hunk header skipped: {line}");
                    stale = true;
                }
            }
            continue;
        }

        if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with('\\') {
            continue;
        }

        let is_added = line.starts_with('+');
        let is_context = line.starts_with(' ');
        if !is_added && !is_context {
            // Removed lines and prelude noise (`diff --git`, `index ...`).
            continue;
        }

        let Some(counter) = new_line.as_mut() else {
            if is_added {
                return Err(ParseError::MissingHunkHeader {
                    line_no: idx + 1,
                    line: line.to_string(),
                });
            }
            continue;
        };

        *counter = counter.checked_add(1).ok_or(ParseError::Overflow)?;
        if is_added {
            if stale {
                warn!(
                    line = *counter,
                    "anchor computed after a malformed hunk header; line may be off"
                );
            }
            return Ok(Some(*counter));
        }
    }

    Ok(None)
}

/// `new_start` of a hunk header, or `None` when the header is malformed.
fn parse_new_start(header: &str) -> Option<u32> {
    let caps = HUNK_HEADER.captures(header)?;
    caps.get(3)?.as_str().parse().ok()
}

/// Simple heuristic to detect binary patches or messages in unified diff.
///
/// Only the prelude before the first hunk header is inspected, so an added
/// line that merely mentions a binary patch does not count.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.lines().take_while(|l| !l.starts_with("@@")).any(|l| {
        l.starts_with("GIT binary patch")
            || l.starts_with("Binary files ")
            || (l.starts_with("Files ") && l.ends_with(" differ"))
    })
}

/// Whether `wanted` is an added or context line on the new side of `diff`.
///
/// Lines under a malformed hunk header are not trusted.
pub fn new_side_contains(diff: &str, wanted: u32) -> bool {
    if wanted == 0 || diff.trim().is_empty() || looks_like_binary_patch(diff) {
        return false;
    }
    let mut new_line: Option<u32> = None;
    for line in diff.lines() {
        if line.starts_with("@@") {
            new_line = parse_new_start(line).map(|start| start.saturating_sub(1));
            continue;
        }
        let Some(counter) = new_line.as_mut() else {
            continue;
        };
        if line.starts_with('+') || line.starts_with(' ') {
            *counter = counter.saturating_add(1);
            if *counter == wanted {
                return true;
            }
        }
    }
    false
}

/// Where an inline comment could land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffAnchor {
    /// Anchor line on the new side; `old_path` differs from `path` for renames.
    Line {
        path: String,
        old_path: String,
        line: u32,
    },
    /// File is in the diff but has no usable added line (deleted, binary, removals only).
    NoAddedLine { path: String },
    /// Requested path is not part of the MR diff.
    FileNotInDiff { path: String },
    /// Requested line is not on the new side of any hunk of the file.
    LineNotInDiff { path: String, line: u32 },
    /// No path requested and no file in the MR has an added line.
    NothingAdded,
}

impl DiffAnchor {
    fn line_in(file: &MrDiffFile, line: u32) -> Self {
        DiffAnchor::Line {
            path: file.new_path.clone(),
            old_path: file.old_path.clone(),
            line,
        }
    }
}

/// Diff entry for `path`, matched on `new_path`, then `old_path`.
fn find_file<'a>(files: &'a [MrDiffFile], path: &str) -> Option<&'a MrDiffFile> {
    files
        .iter()
        .find(|f| f.new_path == path)
        .or_else(|| files.iter().find(|f| f.old_path == path))
}

/// Picks the anchor line for `path` (matched on `new_path`, then
/// `old_path`), or for the first file with an addition when `path` is `None`.
pub fn first_added_line_in_diffs(files: &[MrDiffFile], path: Option<&str>) -> DiffAnchor {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(wanted) => {
            let Some(file) = find_file(files, wanted) else {
                return DiffAnchor::FileNotInDiff {
                    path: wanted.to_string(),
                };
            };
            match anchor_line(file) {
                Some(line) => DiffAnchor::line_in(file, line),
                None => DiffAnchor::NoAddedLine {
                    path: file.new_path.clone(),
                },
            }
        }
        None => files
            .iter()
            .find_map(|f| anchor_line(f).map(|line| DiffAnchor::line_in(f, line)))
            .unwrap_or(DiffAnchor::NothingAdded),
    }
}

/// Checks a caller-chosen `path:line` against the MR diff.
pub fn locate_line_in_diffs(files: &[MrDiffFile], path: &str, line: u32) -> DiffAnchor {
    let wanted = path.trim();
    let Some(file) = find_file(files, wanted) else {
        return DiffAnchor::FileNotInDiff {
            path: wanted.to_string(),
        };
    };
    if file.deleted_file {
        return DiffAnchor::NoAddedLine {
            path: file.new_path.clone(),
        };
    }
    match file.diff.as_deref() {
        Some(diff) if new_side_contains(diff, line) => DiffAnchor::line_in(file, line),
        _ => DiffAnchor::LineNotInDiff {
            path: file.new_path.clone(),
            line,
        },
    }
}

fn anchor_line(file: &MrDiffFile) -> Option<u32> {
    if file.deleted_file {
        return None;
    }
    file.diff.as_deref().and_then(resolve_first_added_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_added_after_context() {
        let diff = "@@ -1,2 +1,3 @@\n context\n-old\n+new1\n+new2\n";
        assert_eq!(resolve_first_added_line(diff), Some(2));
    }

    #[test]
    fn skips_file_headers_and_removals() {
        let diff = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -10,3 +10,3 @@\n-a\n-b\n c\n+d\n";
        assert_eq!(resolve_first_added_line(diff), Some(11));
    }

    #[test]
    fn continues_into_later_hunks() {
        let diff = "@@ -1,2 +1,1 @@\n a\n-b\n@@ -40 +39,2 @@\n x\n+y\n";
        assert_eq!(resolve_first_added_line(diff), Some(40));
    }

    #[test]
    fn header_without_lengths() {
        assert_eq!(resolve_first_added_line("@@ -0,0 +1 @@\n+only\n"), Some(1));
    }

    #[test]
    fn no_additions_or_empty() {
        assert_eq!(resolve_first_added_line(""), None);
        assert_eq!(resolve_first_added_line("@@ -1,2 +1 @@\n a\n-b\n"), None);
        assert_eq!(resolve_first_added_line("\\ No newline at end of file\n"), None);
    }

    #[test]
    fn binary_patch_has_no_anchor() {
        assert_eq!(
            resolve_first_added_line("Binary files a/x.png and b/x.png differ\n"),
            None
        );
    }

    #[test]
    fn malformed_header_keeps_previous_counter() {
        // Second header is unparseable; counter continues from the first hunk.
        let diff = "@@ -1,1 +5,1 @@\n a\n@@ garbage @@\n+b\n";
        assert_eq!(scan_first_added_line(diff), Ok(Some(6)));
    }

    #[test]
    fn addition_before_any_valid_header_is_a_precondition_violation() {
        let diff = "@@ nonsense @@\n+added\n";
        assert!(matches!(
            scan_first_added_line(diff),
            Err(ParseError::MissingHunkHeader { line_no: 2, .. })
        ));
        assert_eq!(resolve_first_added_line(diff), None);
    }

    fn file(path: &str, diff: Option<&str>) -> MrDiffFile {
        MrDiffFile {
            old_path: path.into(),
            new_path: path.into(),
            diff: diff.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn anchors_requested_or_first_file() {
        let files = vec![
            file("a.rs", Some("@@ -1 +1 @@\n-x\n")),
            file("b.rs", Some("@@ -3,1 +3,2 @@\n c\n+d\n")),
        ];
        assert_eq!(
            first_added_line_in_diffs(&files, None),
            DiffAnchor::Line {
                path: "b.rs".into(),
                old_path: "b.rs".into(),
                line: 4
            }
        );
        assert_eq!(
            first_added_line_in_diffs(&files, Some("a.rs")),
            DiffAnchor::NoAddedLine { path: "a.rs".into() }
        );
        assert_eq!(
            first_added_line_in_diffs(&files, Some("zzz.rs")),
            DiffAnchor::FileNotInDiff {
                path: "zzz.rs".into()
            }
        );
        assert_eq!(first_added_line_in_diffs(&[], None), DiffAnchor::NothingAdded);
    }

    #[test]
    fn renamed_file_matches_old_path() {
        let mut f = file("new.rs", Some("@@ -1 +1,2 @@\n a\n+b\n"));
        f.old_path = "old.rs".into();
        assert_eq!(
            first_added_line_in_diffs(&[f], Some("old.rs")),
            DiffAnchor::Line {
                path: "new.rs".into(),
                old_path: "old.rs".into(),
                line: 2
            }
        );
    }

    #[test]
    fn binary_marker_inside_a_hunk_is_plain_text() {
        let diff = "@@ -1 +1,2 @@\n a\n+// GIT binary patch handling\n";
        assert!(!looks_like_binary_patch(diff));
        assert_eq!(resolve_first_added_line(diff), Some(2));
        assert!(looks_like_binary_patch(
            "diff --git a/x.png b/x.png\nindex 1..2\nGIT binary patch\nliteral 10\n"
        ));
    }

    #[test]
    fn new_side_lines_are_context_and_additions() {
        let diff = "@@ -10,3 +10,3 @@\n a\n-b\n+c\n d\n@@ -40 +40,2 @@\n x\n+y\n";
        for line in [10, 11, 12, 40, 41] {
            assert!(new_side_contains(diff, line), "line {line}");
        }
        for line in [0, 9, 13, 39, 42] {
            assert!(!new_side_contains(diff, line), "line {line}");
        }
        assert!(!new_side_contains("@@ broken @@\n+a\n", 1));
    }

    #[test]
    fn explicit_line_is_checked_against_the_file_hunks() {
        let mut renamed = file("new/name.rs", Some("@@ -1,2 +1,3 @@\n a\n+b\n c\n"));
        renamed.old_path = "old/name.rs".into();
        let files = vec![renamed];
        assert_eq!(
            locate_line_in_diffs(&files, "new/name.rs", 3),
            DiffAnchor::Line {
                path: "new/name.rs".into(),
                old_path: "old/name.rs".into(),
                line: 3
            }
        );
        assert_eq!(
            locate_line_in_diffs(&files, "new/name.rs", 50),
            DiffAnchor::LineNotInDiff {
                path: "new/name.rs".into(),
                line: 50
            }
        );
        assert_eq!(
            locate_line_in_diffs(&files, "not/in/diff.rs", 3),
            DiffAnchor::FileNotInDiff {
                path: "not/in/diff.rs".into()
            }
        );
    }
}
