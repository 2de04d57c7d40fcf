//! Lookup over one MR's existing discussions: by diff location and by
//! (author, issue signature). This is the whole duplicate-suppression
//! decision and runs before any write.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use gitlab_api::{Discussion, Note, Position, UserRef};

use crate::ignore::id_string;
use crate::signature::issue_signature;

/// File/line a finding targets (new side of the diff).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TargetLine {
    pub path: String,
    pub line: u32,
    /// Pre-rename path, set only when the file was renamed in the MR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl TargetLine {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            old_path: None,
        }
    }

    /// Keeps `old_path` only when it differs from `path`.
    pub fn renamed_from(mut self, old_path: &str) -> Self {
        self.old_path = (!old_path.is_empty() && old_path != self.path).then(|| old_path.to_string());
        self
    }
}

/// Decodes raw discussion payloads.
///
/// An entry that does not fit [`Discussion`] is rebuilt from its `id` and the
/// notes that still decode (or their bare `body`/`position`), so its location
/// and ignore markers are not lost. Entries without an id are dropped.
pub fn decode_discussions(raw: &[Value]) -> Vec<Discussion> {
    raw.iter()
        .filter_map(|v| match Discussion::deserialize(v) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("discussion does not decode ({e}); keeping what is readable");
                salvage_discussion(v)
            }
        })
        .filter(|d| !d.id.is_empty())
        .collect()
}

fn salvage_discussion(v: &Value) -> Option<Discussion> {
    let id = id_string(v.get("id")?)?;
    let notes = v
        .get("notes")
        .and_then(Value::as_array)
        .map(|notes| notes.iter().map(salvage_note).collect())
        .unwrap_or_default();
    Some(Discussion {
        id,
        notes,
        ..Default::default()
    })
}

fn salvage_note(v: &Value) -> Note {
    Note::deserialize(v).unwrap_or_else(|_| Note {
        id: v.get("id").and_then(Value::as_u64).unwrap_or_default(),
        body: v.get("body").and_then(Value::as_str).map(str::to_string),
        position: v.get("position").and_then(|p| Position::deserialize(p).ok()),
        system: v.get("system").and_then(Value::as_bool).unwrap_or_default(),
        ..Default::default()
    })
}

/// The bot user that posts findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActingIdentity {
    pub id: Option<u64>,
    pub username: Option<String>,
}

impl ActingIdentity {
    /// Ids win when both sides have one; otherwise usernames are compared
    /// case-insensitively. An identity with neither never matches.
    pub fn matches(&self, author: &UserRef) -> bool {
        if let (Some(a), Some(b)) = (self.id, author.id) {
            return a == b;
        }
        match (self.username.as_deref(), author.username.as_deref()) {
            (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            _ => false,
        }
    }
}

impl From<&UserRef> for ActingIdentity {
    fn from(u: &UserRef) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
        }
    }
}

/// Outcome of the reuse lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteReuse {
    /// A human silenced this location: do nothing.
    Ignored { discussion_id: String },
    /// Same author and same issue already posted here: edit that note.
    Update { discussion_id: String, note_id: u64 },
}

fn note_hits(note: &Note, target: &TargetLine) -> bool {
    note.position
        .as_ref()
        .is_some_and(|p| p.path() == Some(target.path.as_str()) && p.line() == Some(target.line))
}

/// Whether any note of the discussion is anchored exactly on `target`.
pub fn discussion_hits(discussion: &Discussion, target: &TargetLine) -> bool {
    discussion.notes.iter().any(|n| note_hits(n, target))
}

/// First discussion anchored exactly on `target` (path and line equality).
pub fn find_by_position<'a>(
    discussions: &'a [Discussion],
    target: &TargetLine,
) -> Option<&'a Discussion> {
    discussions.iter().find(|d| discussion_hits(d, target))
}

/// Decides skip / update / create for a finding at `target`.
///
/// 1. a discussion on `target` is in `ignored` → `Ignored`;
/// 2. a non-system note on `target` by `acting` with the same signature,
///    most recent first → `Update`;
/// 3. otherwise `None` (create).
pub fn find_reusable_note(
    discussions: &[Discussion],
    acting: &ActingIdentity,
    target: &TargetLine,
    signature: &str,
    ignored: &HashSet<String>,
) -> Option<NoteReuse> {
    let hits: Vec<&Discussion> = discussions
        .iter()
        .filter(|d| discussion_hits(d, target))
        .collect();

    if let Some(d) = hits.iter().find(|d| ignored.contains(&d.id)) {
        return Some(NoteReuse::Ignored {
            discussion_id: d.id.clone(),
        });
    }

    if signature.is_empty() {
        return None;
    }

    for d in hits.iter().rev() {
        for n in d.notes.iter().rev() {
            if n.system {
                continue;
            }
            let by_bot = n.author.as_ref().is_some_and(|a| acting.matches(a));
            if by_bot && issue_signature(n.body_text()) == signature {
                return Some(NoteReuse::Update {
                    discussion_id: d.id.clone(),
                    note_id: n.id,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &str, line: u32) -> Position {
        Position {
            new_path: Some(path.into()),
            new_line: Some(line),
            ..Default::default()
        }
    }

    fn note(id: u64, author_id: u64, body: &str, position: Option<Position>) -> Note {
        Note {
            id,
            body: Some(body.into()),
            author: Some(UserRef {
                id: Some(author_id),
                username: Some(format!("user{author_id}")),
                ..Default::default()
            }),
            position,
            ..Default::default()
        }
    }

    fn bot() -> ActingIdentity {
        ActingIdentity {
            id: Some(7),
            username: Some("review-bot".into()),
        }
    }

    #[test]
    fn undecodable_entries_keep_location_and_body() {
        let raw = serde_json::json!([
            { "id": "ok", "notes": [{ "id": 1, "body": "fine" }] },
            { "id": 99, "notes": [
                { "id": "n-1", "body": "@gemini ignore", "position": { "new_path": "a.ts", "new_line": 5 } }
            ], "resolved": "maybe" },
            { "notes": [] }
        ]);
        let ds = decode_discussions(raw.as_array().unwrap());
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[1].id, "99");
        assert_eq!(ds[1].notes[0].body_text(), "@gemini ignore");
        assert!(find_by_position(&ds, &TargetLine::new("a.ts", 5)).is_some());
    }

    #[test]
    fn renamed_from_only_records_a_real_rename() {
        assert_eq!(TargetLine::new("a.rs", 1).renamed_from("a.rs").old_path, None);
        assert_eq!(
            TargetLine::new("new.rs", 1).renamed_from("old.rs").old_path.as_deref(),
            Some("old.rs")
        );
    }

    fn fixture() -> Vec<Discussion> {
        vec![
            Discussion {
                id: "d-other".into(),
                notes: vec![note(1, 7, "Null ref", Some(pos("a.ts", 6)))],
                ..Default::default()
            },
            Discussion {
                id: "d-5".into(),
                notes: vec![
                    note(10, 7, "Null ref\nmore detail", Some(pos("a.ts", 5))),
                    note(11, 3, "agreed", Some(pos("a.ts", 5))),
                ],
                ..Default::default()
            },
        ]
    }

    #[test]
    fn finds_by_exact_position_only() {
        let ds = fixture();
        assert_eq!(
            find_by_position(&ds, &TargetLine::new("a.ts", 5)).map(|d| d.id.as_str()),
            Some("d-5")
        );
        assert!(find_by_position(&ds, &TargetLine::new("a.ts", 4)).is_none());
        assert!(find_by_position(&ds, &TargetLine::new("b.ts", 5)).is_none());
    }

    #[test]
    fn old_side_position_is_matched_through_fallback() {
        let ds = vec![Discussion {
            id: "old".into(),
            notes: vec![note(
                1,
                7,
                "x",
                Some(Position {
                    old_path: Some("gone.rs".into()),
                    old_line: Some(9),
                    ..Default::default()
                }),
            )],
            ..Default::default()
        }];
        assert!(find_by_position(&ds, &TargetLine::new("gone.rs", 9)).is_some());
    }

    #[test]
    fn same_author_same_signature_is_reused() {
        let ds = fixture();
        let got = find_reusable_note(
            &ds,
            &bot(),
            &TargetLine::new("a.ts", 5),
            &issue_signature("null   REF"),
            &HashSet::new(),
        );
        assert_eq!(
            got,
            Some(NoteReuse::Update {
                discussion_id: "d-5".into(),
                note_id: 10
            })
        );
    }

    #[test]
    fn ignore_wins_over_reuse() {
        let ds = fixture();
        let ignored = HashSet::from(["d-5".to_string()]);
        let got = find_reusable_note(
            &ds,
            &bot(),
            &TargetLine::new("a.ts", 5),
            "null ref",
            &ignored,
        );
        assert_eq!(
            got,
            Some(NoteReuse::Ignored {
                discussion_id: "d-5".into()
            })
        );
    }

    #[test]
    fn other_author_or_signature_means_create() {
        let ds = fixture();
        let target = TargetLine::new("a.ts", 5);
        let stranger = ActingIdentity {
            id: Some(99),
            username: None,
        };
        assert_eq!(
            find_reusable_note(&ds, &stranger, &target, "null ref", &HashSet::new()),
            None
        );
        assert_eq!(
            find_reusable_note(&ds, &bot(), &target, "unused import", &HashSet::new()),
            None
        );
        assert_eq!(find_reusable_note(&ds, &bot(), &target, "", &HashSet::new()), None);
    }

    #[test]
    fn system_notes_are_never_reused() {
        let mut ds = fixture();
        ds[1].notes[0].system = true;
        assert_eq!(
            find_reusable_note(
                &ds,
                &bot(),
                &TargetLine::new("a.ts", 5),
                "null ref",
                &HashSet::new()
            ),
            None
        );
    }

    #[test]
    fn username_matching_when_ids_unknown() {
        let by_name = ActingIdentity {
            id: None,
            username: Some("USER7".into()),
        };
        let ds = fixture();
        assert!(matches!(
            find_reusable_note(
                &ds,
                &by_name,
                &TargetLine::new("a.ts", 5),
                "null ref",
                &HashSet::new()
            ),
            Some(NoteReuse::Update { note_id: 10, .. })
        ));
        assert!(!ActingIdentity::default().matches(&UserRef::default()));
    }
}
