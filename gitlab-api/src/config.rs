//! GitLab connection settings loaded from environment variables.
//!
//! # Environment variables
//!
//! - `GITLAB_API_URL`           = API base (fallback `CI_API_V4_URL`, then `https://gitlab.com/api/v4`)
//! - `GITLAB_TOKEN`             = credential (fallback `CI_JOB_TOKEN` for the `job-token` strategy)
//! - `GITLAB_AUTH_HEADER`       = `bearer` | `private-token` | `job-token` (default `private-token`)
//! - `GITLAB_HTTP_TIMEOUT_SECS` = request timeout (default 30)
//! - `GITLAB_MAX_PAGES`         = pagination cap for list endpoints (default 50)
//!
//! The config is built once at startup and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

use crate::errors::{ConfigError, GitLabError, GitLabResult};

const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_PAGES: u32 = 50;

/// Which header carries the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>` (OAuth / PAT).
    Bearer,
    /// `PRIVATE-TOKEN: <token>` (PAT / project / group token).
    #[default]
    PrivateToken,
    /// `JOB-TOKEN: <token>` (CI job token).
    JobToken,
}

impl AuthStrategy {
    /// Header name and value for this strategy.
    pub fn header(&self, token: &str) -> GitLabResult<(HeaderName, HeaderValue)> {
        let (name, raw) = match self {
            AuthStrategy::Bearer => (AUTHORIZATION, format!("Bearer {token}")),
            AuthStrategy::PrivateToken => (HeaderName::from_static("private-token"), token.to_string()),
            AuthStrategy::JobToken => (HeaderName::from_static("job-token"), token.to_string()),
        };
        let mut value = HeaderValue::from_str(&raw)
            .map_err(|e| GitLabError::Validation(format!("bad token: {e}")))?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

impl FromStr for AuthStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "bearer" | "authorization" | "oauth" => Ok(AuthStrategy::Bearer),
            "private-token" | "private" | "pat" => Ok(AuthStrategy::PrivateToken),
            "job-token" | "job" => Ok(AuthStrategy::JobToken),
            other => Err(ConfigError::UnsupportedAuth(other.to_string())),
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthStrategy::Bearer => "bearer",
            AuthStrategy::PrivateToken => "private-token",
            AuthStrategy::JobToken => "job-token",
        })
    }
}

/// Immutable connection settings shared by every request.
#[derive(Clone)]
pub struct GitLabConfig {
    /// API base, e.g. "https://gitlab.com/api/v4" (no trailing slash).
    pub base_api: String,
    /// Credential attached to every call.
    pub token: String,
    pub auth: AuthStrategy,
    pub timeout_secs: u64,
    /// Upper bound of pages fetched by paginated list calls.
    pub max_pages: u32,
}

// Keeps the token out of logs.
impl fmt::Debug for GitLabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabConfig")
            .field("base_api", &self.base_api)
            .field("token", &"***")
            .field("auth", &self.auth)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl GitLabConfig {
    /// Config with defaults for everything except the endpoint and token.
    pub fn new(base_api: impl Into<String>, token: impl Into<String>, auth: AuthStrategy) -> Self {
        Self {
            base_api: base_api.into().trim_end_matches('/').to_string(),
            token: token.into(),
            auth,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth = match get("GITLAB_AUTH_HEADER") {
            Some(v) => v.parse::<AuthStrategy>()?,
            None => AuthStrategy::default(),
        };

        let base_api = get("GITLAB_API_URL")
            .or_else(|| get("CI_API_V4_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_api = base_api.trim().trim_end_matches('/').to_string();
        if !(base_api.starts_with("http://") || base_api.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_api));
        }

        let token = match (get("GITLAB_TOKEN"), auth) {
            (Some(t), _) => t,
            (None, AuthStrategy::JobToken) => {
                get("CI_JOB_TOKEN").ok_or(ConfigError::MissingVar("GITLAB_TOKEN or CI_JOB_TOKEN"))?
            }
            (None, _) => return Err(ConfigError::MissingVar("GITLAB_TOKEN")),
        };

        let timeout_secs = match get("GITLAB_HTTP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                var: "GITLAB_HTTP_TIMEOUT_SECS",
                reason: "expected u64 seconds",
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let max_pages = match get("GITLAB_MAX_PAGES") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "GITLAB_MAX_PAGES",
                    reason: "expected positive u32",
                })?,
            None => DEFAULT_MAX_PAGES,
        };

        Ok(Self {
            base_api,
            token: token.trim().to_string(),
            auth,
            timeout_secs,
            max_pages,
        })
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_gitlab_com_and_private_token() {
        let cfg = GitLabConfig::from_lookup(lookup(&[("GITLAB_TOKEN", "glpat-x")])).unwrap();
        assert_eq!(cfg.base_api, "https://gitlab.com/api/v4");
        assert_eq!(cfg.auth, AuthStrategy::PrivateToken);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_pages, 50);
    }

    #[test]
    fn job_token_falls_back_to_ci_variables() {
        let cfg = GitLabConfig::from_lookup(lookup(&[
            ("GITLAB_AUTH_HEADER", "JOB_TOKEN"),
            ("CI_JOB_TOKEN", "job-123"),
            ("CI_API_V4_URL", "https://git.example.com/api/v4/"),
        ]))
        .unwrap();
        assert_eq!(cfg.auth, AuthStrategy::JobToken);
        assert_eq!(cfg.token, "job-123");
        assert_eq!(cfg.base_api, "https://git.example.com/api/v4");
    }

    #[test]
    fn rejects_missing_token_and_bad_values() {
        assert!(matches!(
            GitLabConfig::from_lookup(lookup(&[])),
            Err(ConfigError::MissingVar("GITLAB_TOKEN"))
        ));
        assert!(matches!(
            GitLabConfig::from_lookup(lookup(&[("GITLAB_TOKEN", "t"), ("GITLAB_AUTH_HEADER", "cookie")])),
            Err(ConfigError::UnsupportedAuth(_))
        ));
        assert!(matches!(
            GitLabConfig::from_lookup(lookup(&[("GITLAB_TOKEN", "t"), ("GITLAB_API_URL", "gitlab.com")])),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            GitLabConfig::from_lookup(lookup(&[("GITLAB_TOKEN", "t"), ("GITLAB_MAX_PAGES", "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn header_per_strategy() {
        let (name, value) = AuthStrategy::Bearer.header("abc").unwrap();
        assert_eq!(name.as_str(), "authorization");
        assert_eq!(value.to_str().unwrap(), "Bearer abc");

        let (name, _) = AuthStrategy::PrivateToken.header("abc").unwrap();
        assert_eq!(name.as_str(), "private-token");

        let (name, value) = AuthStrategy::JobToken.header("abc").unwrap();
        assert_eq!(name.as_str(), "job-token");
        assert!(value.is_sensitive());
    }

    #[test]
    fn debug_hides_token() {
        let cfg = GitLabConfig::new("https://gitlab.com/api/v4/", "secret", AuthStrategy::Bearer);
        assert_eq!(cfg.base_api, "https://gitlab.com/api/v4");
        assert!(!format!("{cfg:?}").contains("secret"));
    }
}
