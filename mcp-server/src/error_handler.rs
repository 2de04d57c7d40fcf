use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use gitlab_api::GitLabError;
use mr_reviewer::RouteError;

/// Failure of one tool call, reported to the agent as a tool error result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    GitLab(#[from] GitLabError),

    /// The router could not post a finding.
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Shorthand for tool bodies.
pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    finding: Option<&'a str>,
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::GitLab(e) => e.kind(),
            ToolError::Route(e) => e.kind(),
            ToolError::BadRequest(_) => "validation",
            ToolError::NotFound(_) => "not_found",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::GitLab(e) => e.status(),
            ToolError::Route(e) => e.status(),
            ToolError::BadRequest(_) => None,
            ToolError::NotFound(_) => Some(404),
        }
    }

    fn message(&self) -> String {
        match self {
            ToolError::Route(e) => e.source.to_string(),
            other => other.to_string(),
        }
    }

    /// `{ "error", "status"?, "message", "finding"? }` as an error result.
    pub fn into_call_result(self) -> CallToolResult {
        let finding = match &self {
            ToolError::Route(e) => Some(e.finding.as_str()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            status: self.status(),
            message: self.message(),
            finding,
        };
        warn!(kind = body.error, status = ?body.status, "tool failed: {}", body.message);
        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.message.clone());
        CallToolResult::error(vec![Content::text(text)])
    }
}

/// Pretty JSON success, or the structured error payload.
pub fn json_reply<T, E>(res: Result<T, E>) -> Result<CallToolResult, McpError>
where
    T: Serialize,
    E: Into<ToolError>,
{
    Ok(match res {
        Ok(v) => match serde_json::to_string_pretty(&v) {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(e) => ToolError::GitLab(GitLabError::from(e)).into_call_result(),
        },
        Err(e) => e.into().into_call_result(),
    })
}

/// Raw text success (file contents, job logs), or the structured error payload.
pub fn text_reply<E>(res: Result<String, E>) -> Result<CallToolResult, McpError>
where
    E: Into<ToolError>,
{
    Ok(match res {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => e.into().into_call_result(),
    })
}
