//! Human "ignore" markers on discussions.
//!
//! A reviewer silences a thread by writing one of these anywhere in a note:
//!
//! - `@gemini ignore`
//! - `/gemini ignore`
//! - `<!-- gemini-ignore -->` (any HTML comment containing `gemini-ignore`)
//!
//! Matching is case-insensitive and does not care about surrounding text,
//! so `@gemini ignored` or `/gemini ignore_this` count too.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use gitlab_api::Discussion;

lazy_static! {
    static ref IGNORE_MARKERS: [Regex; 3] = [
        Regex::new(r"(?i)@gemini\s+ignore").expect("static marker regex"),
        Regex::new(r"(?i)/gemini\s+ignore").expect("static marker regex"),
        Regex::new(r"(?is)<!--.*?gemini-ignore.*?-->").expect("static marker regex"),
    ];
}

/// True when the text carries any ignore marker.
pub fn has_ignore_marker(text: &str) -> bool {
    IGNORE_MARKERS.iter().any(|re| re.is_match(text))
}

/// IDs of discussions where any note (system notes included) has a marker.
pub fn find_ignored_discussion_ids(discussions: &[Discussion]) -> HashSet<String> {
    let ignored: HashSet<String> = discussions
        .iter()
        .filter(|d| !d.id.is_empty())
        .filter(|d| d.notes.iter().any(|n| has_ignore_marker(n.body_text())))
        .map(|d| d.id.clone())
        .collect();
    debug!(
        "ignore scan: {} of {} discussions ignored",
        ignored.len(),
        discussions.len()
    );
    ignored
}

/// Same scan over raw discussion JSON, so entries that do not decode into
/// [`Discussion`] still count.
///
/// Non-object entries, entries without `id`, notes without a string `body`
/// are all treated as "no match".
pub fn find_ignored_in_json(discussions: &[Value]) -> HashSet<String> {
    discussions
        .iter()
        .filter_map(|d| {
            let id = id_string(d.get("id")?)?;
            let notes = d.get("notes")?.as_array()?;
            notes
                .iter()
                .filter_map(|n| n.get("body").and_then(Value::as_str))
                .any(has_ignore_marker)
                .then_some(id)
        })
        .collect()
}

/// Parses a precomputed ignore list (the `IGNORED_DISCUSSIONS` variable).
///
/// Accepts a JSON array of strings and/or numbers. Anything else yields an
/// empty set.
pub fn parse_ignored_env(raw: Option<&str>) -> HashSet<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return HashSet::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.iter().filter_map(id_string).collect(),
        Ok(_) => {
            warn!("IGNORED_DISCUSSIONS is not a JSON array; ignoring it");
            HashSet::new()
        }
        Err(e) => {
            warn!("IGNORED_DISCUSSIONS is not valid JSON ({e}); ignoring it");
            HashSet::new()
        }
    }
}

pub(crate) fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlab_api::Note;
    use serde_json::json;

    fn discussion(id: &str, bodies: &[Option<&str>]) -> Discussion {
        Discussion {
            id: id.into(),
            notes: bodies
                .iter()
                .enumerate()
                .map(|(i, b)| Note {
                    id: i as u64 + 1,
                    body: b.map(str::to_string),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn marker_on_its_own_line_is_detected() {
        let ds = vec![
            discussion("d1", &[Some("looks fine\n@gemini ignore\n")]),
            discussion("d2", &[Some("please ignore this typo")]),
        ];
        let ignored = find_ignored_discussion_ids(&ds);
        assert!(ignored.contains("d1"));
        assert!(!ignored.contains("d2"));
    }

    #[test]
    fn all_marker_forms_case_insensitive() {
        assert!(has_ignore_marker("  /GEMINI Ignore  "));
        assert!(has_ignore_marker("ok <!-- reviewer: Gemini-Ignore --> thanks"));
        assert!(has_ignore_marker("<!--\ngemini-ignore\n-->"));
        assert!(has_ignore_marker("@gemini   ignore please"));
        assert!(!has_ignore_marker("gemini ignore"));
        assert!(!has_ignore_marker("@gemini please"));
    }

    #[test]
    fn trailing_text_after_the_token_still_matches() {
        assert!(has_ignore_marker("@gemini ignored"));
        assert!(has_ignore_marker("@gemini ignore_this"));
        assert!(has_ignore_marker("/gemini ignored-by-default"));
    }

    #[test]
    fn any_note_in_thread_counts_and_missing_bodies_do_not_crash() {
        let ds = vec![discussion("d3", &[None, Some("first"), Some("/gemini ignore")])];
        assert_eq!(
            find_ignored_discussion_ids(&ds),
            HashSet::from(["d3".to_string()])
        );
        assert!(find_ignored_discussion_ids(&[discussion("d4", &[None])]).is_empty());
    }

    #[test]
    fn raw_json_scan_is_defensive() {
        let v = json!([
            { "id": "a", "notes": [{ "body": "@gemini ignore" }] },
            { "id": 17, "notes": [{ "body": null }, { "body": "<!-- gemini-ignore -->" }] },
            { "notes": [{ "body": "@gemini ignore" }] },
            { "id": "b" },
            "garbage",
            { "id": "c", "notes": [{ "id": "not-a-number", "body": "/gemini ignore" }] }
        ]);
        assert_eq!(
            find_ignored_in_json(v.as_array().unwrap()),
            HashSet::from(["a".to_string(), "17".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn env_list_parsing_never_fails() {
        assert_eq!(
            parse_ignored_env(Some(r#"["abc", 12, null, ""]"#)),
            HashSet::from(["abc".to_string(), "12".to_string()])
        );
        assert!(parse_ignored_env(Some("not json")).is_empty());
        assert!(parse_ignored_env(Some(r#"{"a":1}"#)).is_empty());
        assert!(parse_ignored_env(Some("  ")).is_empty());
        assert!(parse_ignored_env(None).is_empty());
    }
}
