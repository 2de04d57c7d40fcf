//! Crate-wide error hierarchy for mr-reviewer.
//!
//! Goals:
//! - Single root `Error` for fallible public functions.
//! - Upstream GitLab failures keep their status so tools can report it.
//! - Anchoring problems are *not* errors: they are `FallbackReason` values
//!   consumed by the router (see `router.rs`).

use gitlab_api::GitLabError;
use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type MrResult<T> = Result<T, Error>;

/// Root error type for the mr-reviewer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// GitLab request failed (non-2xx, transport, decode).
    #[error(transparent)]
    GitLab(#[from] GitLabError),

    /// Unified diff violated a parsing precondition.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Configuration problems (bad numbers in env, ...).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input validation errors (empty body, ...).
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// HTTP status of the upstream failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::GitLab(e) => e.status(),
            _ => None,
        }
    }

    /// Short machine-readable kind used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::GitLab(e) => e.kind(),
            Error::Parse(_) => "diff_parse",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
        }
    }
}

/// Unified diff parser errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A content line appeared before any valid `@@ ... @@` header.
    #[error("diff content before any valid hunk header (line {line_no}): {line}")]
    MissingHunkHeader { line_no: usize, line: String },

    /// Line counter overflowed `u32`.
    #[error("integer overflow")]
    Overflow,
}

/// Review configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },
}
