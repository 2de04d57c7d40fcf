//! Review-side settings.
//!
//! - `MR_CONTEXT_MAX_DISCUSSIONS` = discussions summarized (default 20)
//! - `MR_CONTEXT_PREVIEW_CHARS`   = preview length in chars (default 220)
//! - `IGNORED_DISCUSSIONS`        = JSON array of discussion ids to treat as ignored
//! - `REVIEW_BOT_USER_ID` / `REVIEW_BOT_USERNAME` = acting identity override

use std::collections::HashSet;

use crate::errors::ConfigError;
use crate::ignore::parse_ignored_env;
use crate::index::ActingIdentity;

const DEFAULT_MAX_DISCUSSIONS: usize = 20;
const DEFAULT_PREVIEW_CHARS: usize = 220;

/// Caps for [`crate::summary::summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryConfig {
    pub max_discussions: usize,
    pub preview_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_discussions: DEFAULT_MAX_DISCUSSIONS,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

/// Everything the review core reads from the environment, built once.
#[derive(Debug, Clone, Default)]
pub struct ReviewConfig {
    pub summary: SummaryConfig,
    /// Discussion ids ignored regardless of markers.
    pub env_ignored: HashSet<String>,
    /// Acting identity override; `None` means "ask GitLab (`GET /user`)".
    pub bot_identity: Option<ActingIdentity>,
}

impl ReviewConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let summary = SummaryConfig {
            max_discussions: env_usize(
                get("MR_CONTEXT_MAX_DISCUSSIONS"),
                "MR_CONTEXT_MAX_DISCUSSIONS",
                DEFAULT_MAX_DISCUSSIONS,
            )?,
            preview_chars: env_usize(
                get("MR_CONTEXT_PREVIEW_CHARS"),
                "MR_CONTEXT_PREVIEW_CHARS",
                DEFAULT_PREVIEW_CHARS,
            )?,
        };

        let bot_id = match get("REVIEW_BOT_USER_ID") {
            Some(v) => Some(v.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                var: "REVIEW_BOT_USER_ID",
                reason: "expected a positive integer",
            })?),
            None => None,
        };
        let bot_username = get("REVIEW_BOT_USERNAME");
        let bot_identity = (bot_id.is_some() || bot_username.is_some()).then(|| ActingIdentity {
            id: bot_id,
            username: bot_username,
        });

        Ok(Self {
            summary,
            env_ignored: parse_ignored_env(get("IGNORED_DISCUSSIONS").as_deref()),
            bot_identity,
        })
    }
}

fn env_usize(raw: Option<String>, var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber {
            var,
            reason: "expected a non-negative integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ReviewConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.summary, SummaryConfig::default());
        assert_eq!(cfg.summary.max_discussions, 20);
        assert_eq!(cfg.summary.preview_chars, 220);
        assert!(cfg.env_ignored.is_empty());
        assert!(cfg.bot_identity.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = ReviewConfig::from_lookup(lookup(&[
            ("MR_CONTEXT_MAX_DISCUSSIONS", "5"),
            ("MR_CONTEXT_PREVIEW_CHARS", " 80 "),
            ("IGNORED_DISCUSSIONS", r#"["a", 3]"#),
            ("REVIEW_BOT_USERNAME", "review-bot"),
        ]))
        .unwrap();
        assert_eq!(cfg.summary.max_discussions, 5);
        assert_eq!(cfg.summary.preview_chars, 80);
        assert_eq!(cfg.env_ignored.len(), 2);
        assert_eq!(
            cfg.bot_identity,
            Some(ActingIdentity {
                id: None,
                username: Some("review-bot".into())
            })
        );
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = ReviewConfig::from_lookup(lookup(&[("MR_CONTEXT_PREVIEW_CHARS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MR_CONTEXT_PREVIEW_CHARS"));
        assert!(ReviewConfig::from_lookup(lookup(&[("REVIEW_BOT_USER_ID", "-1")])).is_err());
    }
}
