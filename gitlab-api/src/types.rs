//! Typed subset of GitLab REST resources used by the review core.
//!
//! GitLab payloads are duck-typed in practice: notes without `position`,
//! authors without `bot`, half-filled `diff_refs` on fresh MRs. Every field
//! that can be absent is an `Option` (or defaulted) so that deserialization
//! never fails on a partial payload. Tools that only relay data to the agent
//! use raw `serde_json::Value` instead of these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A unique reference to a merge request.
///
/// * `project` – numeric ID or "group/project" path (URL-encoded on use).
/// * `iid`     – MR IID inside the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestId {
    pub project: String,
    pub iid: u64,
}

impl ChangeRequestId {
    pub fn new(project: impl Into<String>, iid: u64) -> Self {
        Self {
            project: project.into(),
            iid,
        }
    }
}

/// Triple of SHAs identifying one diff version of an MR.
///
/// GitLab omits `diff_refs` (or single SHAs) while a fresh MR is still being
/// prepared, so each one is optional on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRefs {
    #[serde(default)]
    pub base_sha: Option<String>,
    #[serde(default)]
    pub start_sha: Option<String>,
    #[serde(default)]
    pub head_sha: Option<String>,
}

impl DiffRefs {
    /// Names of the SHAs that are missing or blank (`base_sha`, `start_sha`, `head_sha`).
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("base_sha", &self.base_sha),
            ("start_sha", &self.start_sha),
            ("head_sha", &self.head_sha),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().is_none_or(|s| s.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Author of a note or MR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Present on newer GitLab versions for bot/service accounts.
    #[serde(default)]
    pub bot: Option<bool>,
}

/// Diff position of an inline note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u32>,
}

/// The only position type GitLab accepts for line comments we create.
pub const POSITION_TYPE_TEXT: &str = "text";

impl Position {
    /// Text position on an added/context line of the new file.
    pub fn text_on_new_line(refs: &DiffRefs, path: &str, line: u32) -> Self {
        Self {
            position_type: Some(POSITION_TYPE_TEXT.to_string()),
            base_sha: refs.base_sha.clone(),
            start_sha: refs.start_sha.clone(),
            head_sha: refs.head_sha.clone(),
            new_path: Some(path.to_string()),
            old_path: Some(path.to_string()),
            new_line: Some(line),
            old_line: None,
        }
    }

    /// Path of the side the line refers to (`new_path`, fallback `old_path`).
    pub fn path(&self) -> Option<&str> {
        non_blank(self.new_path.as_deref()).or_else(|| non_blank(self.old_path.as_deref()))
    }

    /// Anchored line (`new_line` if present else `old_line`).
    pub fn line(&self) -> Option<u32> {
        self.new_line.or(self.old_line)
    }

    /// At least one line is set and the path on that side is non-empty.
    pub fn is_well_formed(&self) -> bool {
        match (self.new_line, self.old_line) {
            (Some(_), _) => non_blank(self.new_path.as_deref()).is_some(),
            (None, Some(_)) => non_blank(self.old_path.as_deref()).is_some(),
            (None, None) => false,
        }
    }

    /// SHA triple of this position as `DiffRefs`.
    pub fn diff_refs(&self) -> DiffRefs {
        DiffRefs {
            base_sha: self.base_sha.clone(),
            start_sha: self.start_sha.clone(),
            head_sha: self.head_sha.clone(),
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// One note (comment) of a discussion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<UserRef>,
    #[serde(default)]
    pub position: Option<Position>,
    /// GitLab-generated audit note ("added 1 commit", ...).
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub resolvable: bool,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// A comment thread on a merge request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discussion {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub individual_note: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub resolved: Option<bool>,
}

impl Discussion {
    /// Tri-state resolution: the thread flag when present, otherwise derived
    /// from resolvable notes (all resolved → true, any unresolved → false).
    pub fn resolution(&self) -> Option<bool> {
        if self.resolved.is_some() {
            return self.resolved;
        }
        let states: Vec<bool> = self
            .notes
            .iter()
            .filter(|n| n.resolvable)
            .filter_map(|n| n.resolved)
            .collect();
        if states.is_empty() {
            None
        } else {
            Some(states.iter().all(|r| *r))
        }
    }

    /// Position of the first note, if it has one.
    pub fn first_position(&self) -> Option<&Position> {
        self.notes.first().and_then(|n| n.position.as_ref())
    }
}

/// Merge request metadata (subset).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub source_branch: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub diff_refs: Option<DiffRefs>,
    #[serde(default)]
    pub author: Option<UserRef>,
}

/// One file entry of `GET /merge_requests/:iid/diffs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MrDiffFile {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub too_large: Option<bool>,
    #[serde(default)]
    pub generated_file: Option<bool>,
    /// Unified diff; `None` for binary or collapsed files.
    #[serde(default)]
    pub diff: Option<String>,
}

/// GitLab returns discussion ids as hex strings; older endpoints and hand
/// written fixtures sometimes use numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}
