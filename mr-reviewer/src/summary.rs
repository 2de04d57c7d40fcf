//! Compact text digest of an MR's existing discussions for the agent.
//!
//! One bullet per discussion:
//!
//! ```text
//! - [src/a.rs:12] @alice (unresolved, ignored): Null ref on \_user\_ (discussion 9f2c…)
//! ```

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use gitlab_api::{ChangeRequestId, Discussion, Note};

use crate::backend::ReviewBackend;
use crate::config::{ReviewConfig, SummaryConfig};
use crate::ignore::{find_ignored_discussion_ids, find_ignored_in_json};
use crate::index::decode_discussions;

pub const NO_DISCUSSIONS: &str = "No existing discussions found.";
pub const DISCUSSIONS_UNAVAILABLE: &str = "Existing discussions unavailable.";

/// Summarizer output handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MrContext {
    pub context: String,
    /// Sorted ids the agent must not comment into.
    pub ignored_ids: Vec<String>,
}

/// Summarizes the most recent `cfg.max_discussions` discussions.
///
/// Ignore markers are searched in *all* discussions, not only the summarized
/// ones; `extra_ignored` (configured ids) is merged in. No discussions always
/// means no ignored ids.
pub fn summarize(
    discussions: &[Discussion],
    cfg: &SummaryConfig,
    extra_ignored: &HashSet<String>,
) -> MrContext {
    if discussions.is_empty() {
        return MrContext {
            context: NO_DISCUSSIONS.to_string(),
            ignored_ids: Vec::new(),
        };
    }

    let mut ignored = find_ignored_discussion_ids(discussions);
    ignored.extend(extra_ignored.iter().cloned());
    let mut ignored_ids: Vec<String> = ignored.iter().cloned().collect();
    ignored_ids.sort();

    let skip = discussions.len().saturating_sub(cfg.max_discussions);
    let shown = &discussions[skip..];

    let mut lines = Vec::with_capacity(shown.len() + 1);
    if skip > 0 {
        lines.push(format!(
            "Showing the {} most recent of {} discussions.",
            shown.len(),
            discussions.len()
        ));
    }
    lines.extend(
        shown
            .iter()
            .map(|d| bullet(d, ignored.contains(&d.id), cfg.preview_chars)),
    );

    MrContext {
        context: lines.join("\n"),
        ignored_ids,
    }
}

/// Fetches every discussion page and summarizes. Never fails: upstream
/// errors turn into [`DISCUSSIONS_UNAVAILABLE`] with no ignored ids.
///
/// Markers are also scanned on the raw payloads, so an entry that only
/// partly decodes is still reported as ignored.
pub async fn load_mr_context<B: ReviewBackend>(
    backend: &B,
    id: &ChangeRequestId,
    cfg: &ReviewConfig,
) -> MrContext {
    match backend.discussions(id).await {
        Ok(raw) => {
            debug!("summary: {} discussions loaded", raw.len());
            let discussions = decode_discussions(&raw);
            let mut extra = find_ignored_in_json(&raw);
            extra.extend(cfg.env_ignored.iter().cloned());
            summarize(&discussions, &cfg.summary, &extra)
        }
        Err(e) => {
            warn!("summary: discussions unavailable: {e}");
            MrContext {
                context: DISCUSSIONS_UNAVAILABLE.to_string(),
                ignored_ids: Vec::new(),
            }
        }
    }
}

fn bullet(d: &Discussion, ignored: bool, preview_chars: usize) -> String {
    let rep = representative_note(d);
    let author = rep
        .and_then(|n| n.author.as_ref())
        .and_then(|a| a.username.as_deref())
        .unwrap_or("unknown");
    let status = match d.resolution() {
        Some(true) => "resolved",
        Some(false) => "unresolved",
        None => "unknown",
    };
    let flag = if ignored { ", ignored" } else { "" };
    let text = preview(rep.map(Note::body_text).unwrap_or(""), preview_chars);
    format!(
        "- [{}] @{} ({}{}): {} (discussion {})",
        location(d, rep),
        author,
        status,
        flag,
        text,
        d.id
    )
}

/// Latest non-system note, else the last note.
fn representative_note(d: &Discussion) -> Option<&Note> {
    d.notes
        .iter()
        .rev()
        .find(|n| !n.system)
        .or_else(|| d.notes.last())
}

fn location(d: &Discussion, rep: Option<&Note>) -> String {
    let position = rep
        .and_then(|n| n.position.as_ref())
        .or_else(|| d.first_position());
    if let Some((path, line)) = position.and_then(|p| Some((p.path()?, p.line()?))) {
        return format!("{path}:{line}");
    }
    if rep.is_some_and(|n| n.resolvable) || !d.individual_note {
        "Thread (no diff position)".to_string()
    } else {
        "General".to_string()
    }
}

/// Single-line, markdown-escaped, char-capped preview.
fn preview(body: &str, max_chars: usize) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let (cut, truncated) = if flat.chars().count() > max_chars {
        (flat.chars().take(max_chars).collect::<String>(), true)
    } else {
        (flat, false)
    };
    let mut out = String::with_capacity(cut.len() + 8);
    for c in cut.chars() {
        if matches!(c, '`' | '\\' | '*' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    if truncated {
        out.push('…');
    }
    out
}
