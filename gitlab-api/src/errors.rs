//! Crate-wide error hierarchy for gitlab-api.
//!
//! - Single root `GitLabError` for all public functions.
//! - Status-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, ...)
//!   that keeps the response body so callers can show GitLab's own message.
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type GitLabResult<T> = Result<T, GitLabError>;

/// Root error type for the gitlab-api crate.
#[derive(Debug, Error)]
pub enum GitLabError {
    /// GitLab answered with a non-2xx status or the transport failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration problems (bad/missing token, base URL, header strategy).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input validation errors (empty project id, bad header value, ...).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Upstream failure raised by the request layer.
///
/// Every status variant carries the (possibly truncated) response body, since
/// GitLab puts the useful explanation there (`{"message": "..."}`).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Forbidden (HTTP 403).
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Not found (HTTP 404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Rate limited (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimited {
        /// `Retry-After` hint in seconds when GitLab sent one.
        retry_after_secs: Option<u64>,
        message: String,
    },

    /// Gateway / server error (HTTP 5xx).
    #[error("server error: status {status}: {message}")]
    Server { status: u16, message: String },

    /// Other non-2xx status not covered above.
    #[error("http status error: status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without HTTP status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Configuration and setup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// Base API URL does not look like an http(s) endpoint.
    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),

    /// Unknown value for `GITLAB_AUTH_HEADER`.
    #[error("unsupported auth header strategy: {0}")]
    UnsupportedAuth(String),

    /// A number failed to parse.
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },
}

/// Longest response body excerpt kept inside an error.
const MAX_ERROR_BODY: usize = 500;

impl ProviderError {
    /// Builds a status error from a GitLab response status and body.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = error_message_from_body(body);
        match status {
            401 => ProviderError::Unauthorized { message },
            403 => ProviderError::Forbidden { message },
            404 => ProviderError::NotFound { message },
            429 => ProviderError::RateLimited {
                retry_after_secs,
                message,
            },
            500..=599 => ProviderError::Server { status, message },
            _ => ProviderError::HttpStatus { status, message },
        }
    }

    /// HTTP status code, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Unauthorized { .. } => Some(401),
            ProviderError::Forbidden { .. } => Some(403),
            ProviderError::NotFound { .. } => Some(404),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Server { status, .. } | ProviderError::HttpStatus { status, .. } => {
                Some(*status)
            }
            ProviderError::Timeout | ProviderError::Network(_) | ProviderError::Decode(_) => None,
        }
    }
}

impl GitLabError {
    /// HTTP status code of the underlying upstream failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitLabError::Provider(p) => p.status(),
            _ => None,
        }
    }

    /// Short machine-readable kind used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GitLabError::Provider(ProviderError::Timeout)
            | GitLabError::Provider(ProviderError::Network(_)) => "transport",
            GitLabError::Provider(ProviderError::Decode(_)) => "decode",
            GitLabError::Provider(_) => "upstream_http",
            GitLabError::Config(_) => "config",
            GitLabError::Validation(_) => "validation",
        }
    }
}

/// Extracts GitLab's `message`/`error` field, falling back to the raw body.
fn error_message_from_body(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let field = value.get("message").or_else(|| value.get("error"));
        if let Some(field) = field {
            return match field {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
    }
    if trimmed.chars().count() > MAX_ERROR_BODY {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for GitLabError {
    fn from(e: reqwest::Error) -> Self {
        GitLabError::Provider(ProviderError::from(e))
    }
}

impl From<serde_json::Error> for GitLabError {
    fn from(e: serde_json::Error) -> Self {
        GitLabError::Provider(ProviderError::Decode(e.to_string()))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if e.is_decode() {
            return ProviderError::Decode(e.to_string());
        }
        if let Some(status) = e.status() {
            return ProviderError::from_status(status.as_u16(), "", None);
        }
        ProviderError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes_and_keeps_message() {
        let e = ProviderError::from_status(404, r#"{"message":"404 Project Not Found"}"#, None);
        assert!(matches!(e, ProviderError::NotFound { ref message } if message == "404 Project Not Found"));
        assert_eq!(e.status(), Some(404));

        let e = ProviderError::from_status(429, "slow down", Some(7));
        assert!(matches!(
            e,
            ProviderError::RateLimited {
                retry_after_secs: Some(7),
                ..
            }
        ));

        let e = ProviderError::from_status(502, "", None);
        assert_eq!(e.status(), Some(502));
        assert!(matches!(e, ProviderError::Server { status: 502, .. }));

        let e = ProviderError::from_status(409, r#"{"error":"conflict"}"#, None);
        assert!(matches!(e, ProviderError::HttpStatus { status: 409, ref message } if message == "conflict"));
    }

    #[test]
    fn non_json_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY + 50);
        let e = ProviderError::from_status(500, &body, None);
        let ProviderError::Server { message, .. } = e else {
            panic!("expected server error");
        };
        assert_eq!(message.chars().count(), MAX_ERROR_BODY + 1);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn kind_labels() {
        let e = GitLabError::from(ProviderError::Timeout);
        assert_eq!(e.kind(), "transport");
        assert_eq!(e.status(), None);
        let e = GitLabError::from(ProviderError::from_status(403, "", None));
        assert_eq!(e.kind(), "upstream_http");
        assert_eq!(e.status(), Some(403));
    }
}
