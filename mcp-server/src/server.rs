//! Tool catalog.
//!
//! Merge requests:
//!   * get_merge_request, list_merge_request_diffs, list_merge_request_commits
//!
//! Discussions / notes:
//!   * discussion_list, get_mr_review_context
//!   * create_mr_note, update_note
//!   * create_mr_discussion_with_position, create_anchored_discussion_auto
//!
//! Repository / CI / issues:
//!   * get_file_contents
//!   * list_pipelines, get_pipeline, list_pipeline_jobs, get_job_log
//!   * list_issues, get_issue
//!
//! Every failure comes back as a tool error result with a JSON body; nothing
//! is raised to the JSON-RPC layer.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use tracing::info;

use gitlab_api::{GitLabClient, Position};
use mr_reviewer::{Finding, ReviewCommentRouter, ReviewConfig, RoutePolicy, load_mr_context};

use crate::error_handler::{ToolError, ToolResult, json_reply, text_reply};
use crate::params::*;

/// Shared state for all tool handlers. Built once, never mutated.
#[derive(Clone)]
pub struct GitLabMcp {
    client: Arc<GitLabClient>,
    review: Arc<ReviewConfig>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GitLabMcp {
    pub fn new(client: GitLabClient, review: ReviewConfig) -> Self {
        Self {
            client: Arc::new(client),
            review: Arc::new(review),
            tool_router: Self::tool_router(),
        }
    }

    // ----- merge requests -----

    #[tool(description = "Get merge request metadata (title, branches, state, diff_refs).")]
    pub async fn get_merge_request(
        &self,
        Parameters(p): Parameters<MergeRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_merge_request");
        let res: ToolResult<_> = async {
            let id = p.mr_id()?;
            Ok::<_, ToolError>(self.client.merge_request_json(&id).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "List the file diffs of a merge request (all pages).")]
    pub async fn list_merge_request_diffs(
        &self,
        Parameters(p): Parameters<MergeRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool list_merge_request_diffs");
        let res: ToolResult<_> = async {
            let id = p.mr_id()?;
            Ok::<_, ToolError>(self.client.merge_request_diffs_json(&id).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "List the commits of a merge request (all pages).")]
    pub async fn list_merge_request_commits(
        &self,
        Parameters(p): Parameters<MergeRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool list_merge_request_commits");
        let res: ToolResult<_> = async {
            let id = p.mr_id()?;
            Ok::<_, ToolError>(self.client.merge_request_commits_json(&id).await?)
        }
        .await;
        json_reply(res)
    }

    // ----- discussions / notes -----

    #[tool(description = "List all discussions of a merge request as returned by GitLab.")]
    pub async fn discussion_list(
        &self,
        Parameters(p): Parameters<MergeRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool discussion_list");
        let res: ToolResult<_> = async {
            let id = p.mr_id()?;
            Ok::<_, ToolError>(self.client.discussions_json(&id).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(
        description = "Summary of existing discussions plus the ids of ignored discussions. Read this before posting; never comment into an ignored discussion."
    )]
    pub async fn get_mr_review_context(
        &self,
        Parameters(p): Parameters<MergeRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_mr_review_context");
        let id = match p.mr_id() {
            Ok(id) => id,
            Err(e) => return Ok(e.into_call_result()),
        };
        let ctx = load_mr_context(self.client.as_ref(), &id, &self.review).await;
        json_reply::<_, ToolError>(Ok(ctx))
    }

    #[tool(description = "Post a general (non-inline) comment on a merge request.")]
    pub async fn create_mr_note(
        &self,
        Parameters(p): Parameters<CreateNoteParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool create_mr_note");
        let res: ToolResult<_> = async {
            let id = mr_id(&p.project_id, p.merge_request_iid)?;
            non_empty_body(&p.body)?;
            Ok::<_, ToolError>(self.client.create_note(&id, &p.body).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "Replace the body of an existing merge request note.")]
    pub async fn update_note(
        &self,
        Parameters(p): Parameters<UpdateNoteParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool update_note note_id={}", p.note_id);
        let res: ToolResult<_> = async {
            let id = mr_id(&p.project_id, p.merge_request_iid)?;
            non_empty_body(&p.body)?;
            Ok::<_, ToolError>(self.client.update_note(&id, p.note_id, &p.body).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(
        description = "Start an inline discussion at a caller-computed diff position. Ignored discussions are respected; an incomplete SHA triple posts a general comment instead."
    )]
    pub async fn create_mr_discussion_with_position(
        &self,
        Parameters(p): Parameters<PositionedDiscussionParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool create_mr_discussion_with_position");
        let position: Position = p.position.into();
        let finding = Finding::at_position(p.body, position);
        self.route(&p.project_id, p.merge_request_iid, finding, RoutePolicy::EXPLICIT)
            .await
    }

    #[tool(
        description = "Post a finding as an inline discussion. Picks the first added line when file_path/line are omitted, updates the bot's own earlier comment on the same line and issue, skips ignored discussions, and falls back to a general comment when no anchor is possible."
    )]
    pub async fn create_anchored_discussion_auto(
        &self,
        Parameters(p): Parameters<AutoDiscussionParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "tool create_anchored_discussion_auto file={:?} line={:?}",
            p.file_path, p.line
        );
        let finding = Finding::auto(p.body, p.file_path, p.line);
        self.route(&p.project_id, p.merge_request_iid, finding, RoutePolicy::AUTO)
            .await
    }

    // ----- repository -----

    #[tool(description = "Raw contents of a repository file at a branch, tag or commit.")]
    pub async fn get_file_contents(
        &self,
        Parameters(p): Parameters<FileParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_file_contents path={}", p.file_path);
        let res: ToolResult<String> = async {
            let project = p.project_id.resolve()?;
            let path = p.file_path.trim().trim_start_matches('/');
            if path.is_empty() || p.git_ref.trim().is_empty() {
                return Err(ToolError::BadRequest("file_path and ref are required".into()));
            }
            self.client
                .file_raw(&project, path, p.git_ref.trim())
                .await?
                .ok_or_else(|| ToolError::NotFound(format!("{path} does not exist at {}", p.git_ref)))
        }
        .await;
        text_reply(res)
    }

    // ----- pipelines / jobs -----

    #[tool(description = "Most recent pipelines, optionally filtered by ref and status.")]
    pub async fn list_pipelines(
        &self,
        Parameters(p): Parameters<ListPipelinesParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool list_pipelines");
        let res: ToolResult<_> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self
                .client
                .pipelines_json(&project, p.git_ref.as_deref(), p.status.as_deref())
                .await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "Get a single pipeline.")]
    pub async fn get_pipeline(
        &self,
        Parameters(p): Parameters<PipelineParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_pipeline id={}", p.pipeline_id);
        let res: ToolResult<_> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self.client.pipeline_json(&project, p.pipeline_id).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "List the jobs of a pipeline.")]
    pub async fn list_pipeline_jobs(
        &self,
        Parameters(p): Parameters<PipelineParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool list_pipeline_jobs id={}", p.pipeline_id);
        let res: ToolResult<_> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self.client.pipeline_jobs_json(&project, p.pipeline_id).await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "Raw log (trace) of a CI job.")]
    pub async fn get_job_log(
        &self,
        Parameters(p): Parameters<JobParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_job_log id={}", p.job_id);
        let res: ToolResult<String> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self.client.job_log(&project, p.job_id).await?)
        }
        .await;
        text_reply(res)
    }

    // ----- issues -----

    #[tool(description = "Most recent issues, optionally filtered by state and labels.")]
    pub async fn list_issues(
        &self,
        Parameters(p): Parameters<ListIssuesParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool list_issues");
        let res: ToolResult<_> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self
                .client
                .issues_json(&project, p.state.as_deref(), p.labels.as_deref())
                .await?)
        }
        .await;
        json_reply(res)
    }

    #[tool(description = "Get a single issue.")]
    pub async fn get_issue(
        &self,
        Parameters(p): Parameters<IssueParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("tool get_issue iid={}", p.issue_iid);
        let res: ToolResult<_> = async {
            let project = p.project_id.resolve()?;
            Ok::<_, ToolError>(self.client.issue_json(&project, p.issue_iid).await?)
        }
        .await;
        json_reply(res)
    }
}

impl GitLabMcp {
    async fn route(
        &self,
        project: &ProjectRef,
        iid: u64,
        finding: Finding,
        policy: RoutePolicy,
    ) -> Result<CallToolResult, McpError> {
        let res: ToolResult<_> = async {
            let id = mr_id(project, iid)?;
            let router = ReviewCommentRouter::new(self.client.as_ref(), self.review.as_ref());
            let outcome = router.post_finding(&id, &finding, policy).await?;
            info!("tool route outcome: {}", outcome_label(&outcome));
            Ok::<_, ToolError>(outcome)
        }
        .await;
        json_reply(res)
    }
}

fn outcome_label(o: &mr_reviewer::RouteOutcome) -> &'static str {
    match o {
        mr_reviewer::RouteOutcome::Skipped { .. } => "skipped",
        mr_reviewer::RouteOutcome::Updated { .. } => "updated",
        mr_reviewer::RouteOutcome::Created {
            placement: mr_reviewer::Placement::Anchored { .. },
            ..
        } => "created_anchored",
        mr_reviewer::RouteOutcome::Created { .. } => "created_fallback",
    }
}

fn non_empty_body(body: &str) -> ToolResult<()> {
    if body.trim().is_empty() {
        return Err(ToolError::BadRequest("body must not be empty".into()));
    }
    Ok(())
}

#[tool_handler]
impl ServerHandler for GitLabMcp {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::default();
        server_info.name = "mr-ai-gitlab-mcp".to_string();
        server_info.version = env!("CARGO_PKG_VERSION").to_string();

        let mut info = ServerInfo::default();
        info.instructions = Some(
            "GitLab review tools. Call get_mr_review_context first, then post findings with create_anchored_discussion_auto; it avoids duplicates and respects ignored discussions."
                .into(),
        );
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = server_info;
        info
    }
}
