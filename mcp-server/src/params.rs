//! Tool input shapes.
//!
//! `project_id` accepts either a numeric id or a `group/project` path, sent as
//! a JSON number or string.

use rmcp::schemars;
use serde::Deserialize;

use gitlab_api::{ChangeRequestId, Position};

use crate::error_handler::ToolError;

/// Numeric project id or full path.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum ProjectRef {
    Id(u64),
    Path(String),
}

impl ProjectRef {
    /// Value used in `/projects/:id` (encoded by the client).
    pub fn resolve(&self) -> Result<String, ToolError> {
        match self {
            ProjectRef::Id(id) => Ok(id.to_string()),
            ProjectRef::Path(p) => {
                let p = p.trim();
                if p.is_empty() {
                    return Err(ToolError::BadRequest("project_id must not be empty".into()));
                }
                Ok(p.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MergeRequestParams {
    #[schemars(description = "Project id or URL path, e.g. 42 or \"group/app\"")]
    pub project_id: ProjectRef,
    #[schemars(description = "Merge request IID (the number shown in the UI)")]
    pub merge_request_iid: u64,
}

impl MergeRequestParams {
    pub fn mr_id(&self) -> Result<ChangeRequestId, ToolError> {
        mr_id(&self.project_id, self.merge_request_iid)
    }
}

pub(crate) fn mr_id(project: &ProjectRef, iid: u64) -> Result<ChangeRequestId, ToolError> {
    Ok(ChangeRequestId::new(project.resolve()?, iid))
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateNoteParams {
    pub project_id: ProjectRef,
    pub merge_request_iid: u64,
    #[schemars(description = "Markdown body of the comment")]
    pub body: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateNoteParams {
    pub project_id: ProjectRef,
    pub merge_request_iid: u64,
    pub note_id: u64,
    #[schemars(description = "New markdown body, replaces the old one")]
    pub body: String,
}

/// Diff position as GitLab expects it for a `text` discussion.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct PositionInput {
    #[schemars(description = "Only \"text\" is supported; defaults to \"text\"")]
    pub position_type: Option<String>,
    pub base_sha: Option<String>,
    pub start_sha: Option<String>,
    pub head_sha: Option<String>,
    pub new_path: Option<String>,
    pub old_path: Option<String>,
    pub new_line: Option<u32>,
    pub old_line: Option<u32>,
}

impl From<PositionInput> for Position {
    fn from(p: PositionInput) -> Self {
        Position {
            position_type: p.position_type,
            base_sha: p.base_sha,
            start_sha: p.start_sha,
            head_sha: p.head_sha,
            new_path: p.new_path,
            old_path: p.old_path,
            new_line: p.new_line,
            old_line: p.old_line,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PositionedDiscussionParams {
    pub project_id: ProjectRef,
    pub merge_request_iid: u64,
    pub body: String,
    #[schemars(description = "Full position including base_sha, start_sha and head_sha")]
    pub position: PositionInput,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AutoDiscussionParams {
    pub project_id: ProjectRef,
    pub merge_request_iid: u64,
    #[schemars(description = "Finding text; its first line identifies the issue")]
    pub body: String,
    #[schemars(description = "File to comment on; defaults to the first changed file")]
    pub file_path: Option<String>,
    #[schemars(description = "New-side line; defaults to the first added line of the file")]
    pub line: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FileParams {
    pub project_id: ProjectRef,
    #[schemars(description = "Repository-relative path, e.g. src/main.rs")]
    pub file_path: String,
    #[serde(rename = "ref")]
    #[schemars(description = "Branch, tag or commit SHA")]
    pub git_ref: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListPipelinesParams {
    pub project_id: ProjectRef,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[schemars(description = "e.g. running, success, failed")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PipelineParams {
    pub project_id: ProjectRef,
    pub pipeline_id: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct JobParams {
    pub project_id: ProjectRef,
    pub job_id: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListIssuesParams {
    pub project_id: ProjectRef,
    #[schemars(description = "opened, closed or all")]
    pub state: Option<String>,
    #[schemars(description = "Comma-separated label names")]
    pub labels: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IssueParams {
    pub project_id: ProjectRef,
    pub issue_iid: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_id_accepts_number_or_path() {
        let p: MergeRequestParams =
            serde_json::from_value(json!({ "project_id": 42, "merge_request_iid": 3 })).unwrap();
        assert_eq!(p.mr_id().unwrap(), ChangeRequestId::new("42", 3));

        let p: MergeRequestParams = serde_json::from_value(
            json!({ "project_id": " group/app ", "merge_request_iid": 3 }),
        )
        .unwrap();
        assert_eq!(p.mr_id().unwrap().project, "group/app");

        let p: MergeRequestParams =
            serde_json::from_value(json!({ "project_id": "", "merge_request_iid": 3 })).unwrap();
        assert!(p.mr_id().is_err());
    }

    #[test]
    fn ref_is_renamed() {
        let p: FileParams = serde_json::from_value(
            json!({ "project_id": 1, "file_path": "a.rs", "ref": "main" }),
        )
        .unwrap();
        assert_eq!(p.git_ref, "main");
        let p: ListPipelinesParams = serde_json::from_value(json!({ "project_id": 1 })).unwrap();
        assert!(p.git_ref.is_none());
    }
}
