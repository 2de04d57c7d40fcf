//! GitLab REST v4 client.
//!
//! Endpoints used:
//!   * GET  /user
//!   * GET  /projects/:id/merge_requests/:iid
//!   * GET  /projects/:id/merge_requests/:iid/commits
//!   * GET  /projects/:id/merge_requests/:iid/diffs
//!   * GET  /projects/:id/merge_requests/:iid/discussions
//!   * POST /projects/:id/merge_requests/:iid/discussions
//!   * POST /projects/:id/merge_requests/:iid/notes
//!   * PUT  /projects/:id/merge_requests/:iid/notes/:note_id
//!   * GET  /projects/:id/repository/files/:path/raw?ref=:ref
//!   * GET  /projects/:id/pipelines[/:pipeline_id[/jobs]]
//!   * GET  /projects/:id/jobs/:job_id/trace
//!   * GET  /projects/:id/issues[/:issue_iid]
//!
//! Everything goes through [`GitLabClient::request`], which attaches the
//! configured auth header and turns non-2xx answers into [`ProviderError`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::GitLabConfig;
use crate::errors::{GitLabError, GitLabResult, ProviderError};
use crate::types::*;

const PER_PAGE: &str = "100";
/// Page size for "latest N" listings (pipelines, issues).
const RECENT_PAGE_SIZE: &str = "50";

/// GitLab HTTP client wrapper.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: Client,
    base_api: String, // e.g. "https://gitlab.com/api/v4"
    auth: (HeaderName, HeaderValue),
    max_pages: u32,
}

impl GitLabClient {
    /// Constructs a client with a shared HTTP instance from immutable config.
    pub fn from_config(cfg: &GitLabConfig) -> GitLabResult<Self> {
        debug!(
            "Initializing GitLab client: base_api={}, auth={}",
            cfg.base_api, cfg.auth
        );
        let http = Client::builder()
            .user_agent("mr-ai-gitlab-mcp/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_api: cfg.base_api.trim_end_matches('/').to_string(),
            auth: cfg.auth.header(&cfg.token)?,
            max_pages: cfg.max_pages.max(1),
        })
    }

    /// Generic request function used by every endpoint helper.
    ///
    /// `path` is relative to the API base and must start with `/`.
    /// Returns the response only for 2xx statuses.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> GitLabResult<Response> {
        let url = format!("{}{}", self.base_api, path);
        debug!("GitLab {} {}", method, url);

        let mut headers = HeaderMap::new();
        headers.insert(self.auth.0.clone(), self.auth.1.clone());

        let mut req = self.http.request(method, url).headers(headers);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "GitLab request failed");
        Err(ProviderError::from_status(status.as_u16(), &text, retry_after).into())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GitLabResult<T> {
        let resp = self.request(Method::GET, path, query, None).await?;
        decode(resp).await
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> GitLabResult<String> {
        let resp = self.request(Method::GET, path, query, None).await?;
        let bytes = resp.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> GitLabResult<T> {
        let resp = self.request(method, path, &[], Some(body)).await?;
        decode(resp).await
    }

    /// Follows `x-next-page` until exhausted or `max_pages` is reached.
    async fn get_paginated(&self, path: &str, query: &[(&str, String)]) -> GitLabResult<Vec<Value>> {
        let mut out = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut q: Vec<(&str, String)> = query.to_vec();
            q.push(("per_page", PER_PAGE.to_string()));
            q.push(("page", page.to_string()));

            let resp = self.request(Method::GET, path, &q, None).await?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let items: Vec<Value> = decode(resp).await?;
            out.extend(items);

            match next {
                Some(n) if n > page => {
                    if page >= self.max_pages {
                        warn!(
                            "GitLab pagination capped at {} pages for {} ({} items)",
                            self.max_pages,
                            path,
                            out.len()
                        );
                        break;
                    }
                    page = n;
                }
                _ => break,
            }
        }
        debug!("GitLab {} -> {} items", path, out.len());
        Ok(out)
    }

    // ----- users -----

    /// The user the configured token belongs to.
    pub async fn current_user(&self) -> GitLabResult<UserRef> {
        self.get_json("/user", &[]).await
    }

    // ----- merge requests -----

    pub async fn merge_request_json(&self, id: &ChangeRequestId) -> GitLabResult<Value> {
        self.get_json(&mr_path(id, ""), &[]).await
    }

    /// MR metadata including `diff_refs`.
    pub async fn merge_request(&self, id: &ChangeRequestId) -> GitLabResult<MergeRequest> {
        let raw = self.merge_request_json(id).await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn merge_request_commits_json(&self, id: &ChangeRequestId) -> GitLabResult<Vec<Value>> {
        self.get_paginated(&mr_path(id, "/commits"), &[]).await
    }

    pub async fn merge_request_diffs_json(&self, id: &ChangeRequestId) -> GitLabResult<Vec<Value>> {
        self.get_paginated(&mr_path(id, "/diffs"), &[]).await
    }

    /// File-level diffs of the latest MR version.
    pub async fn merge_request_diffs(&self, id: &ChangeRequestId) -> GitLabResult<Vec<MrDiffFile>> {
        let raw = self.merge_request_diffs_json(id).await?;
        let mut files = Vec::with_capacity(raw.len());
        for v in raw {
            files.push(serde_json::from_value(v)?);
        }
        Ok(files)
    }

    // ----- discussions / notes -----

    /// Raw discussion payloads, all pages.
    pub async fn discussions_json(&self, id: &ChangeRequestId) -> GitLabResult<Vec<Value>> {
        self.get_paginated(&mr_path(id, "/discussions"), &[]).await
    }

    /// Starts a discussion; inline when `position` is given.
    pub async fn create_discussion(
        &self,
        id: &ChangeRequestId,
        body: &str,
        position: Option<&Position>,
    ) -> GitLabResult<Value> {
        let mut payload = json!({ "body": body });
        if let Some(p) = position {
            payload["position"] = serde_json::to_value(p)?;
        }
        self.send_json(Method::POST, &mr_path(id, "/discussions"), &payload)
            .await
    }

    /// Posts a top-level MR note.
    pub async fn create_note(&self, id: &ChangeRequestId, body: &str) -> GitLabResult<Value> {
        self.send_json(Method::POST, &mr_path(id, "/notes"), &json!({ "body": body }))
            .await
    }

    /// Replaces the body of an existing MR note.
    pub async fn update_note(
        &self,
        id: &ChangeRequestId,
        note_id: u64,
        body: &str,
    ) -> GitLabResult<Value> {
        self.send_json(
            Method::PUT,
            &mr_path(id, &format!("/notes/{note_id}")),
            &json!({ "body": body }),
        )
        .await
    }

    // ----- repository -----

    /// Raw file text at a ref. `Ok(None)` when the file does not exist there.
    pub async fn file_raw(
        &self,
        project: &str,
        repo_relative_path: &str,
        git_ref: &str,
    ) -> GitLabResult<Option<String>> {
        let path = format!(
            "{}/repository/files/{}/raw",
            project_path(project),
            urlencoding::encode(repo_relative_path)
        );
        match self.get_text(&path, &[("ref", git_ref.to_string())]).await {
            Ok(text) => Ok(Some(text)),
            Err(GitLabError::Provider(ProviderError::NotFound { .. })) => {
                debug!("GitLab file not found at given ref");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ----- pipelines / jobs -----

    /// Most recent pipelines, optionally filtered by ref and status.
    pub async fn pipelines_json(
        &self,
        project: &str,
        git_ref: Option<&str>,
        status: Option<&str>,
    ) -> GitLabResult<Vec<Value>> {
        let mut q = vec![("per_page", RECENT_PAGE_SIZE.to_string())];
        if let Some(r) = git_ref {
            q.push(("ref", r.to_string()));
        }
        if let Some(s) = status {
            q.push(("status", s.to_string()));
        }
        self.get_json(&format!("{}/pipelines", project_path(project)), &q)
            .await
    }

    pub async fn pipeline_json(&self, project: &str, pipeline_id: u64) -> GitLabResult<Value> {
        self.get_json(
            &format!("{}/pipelines/{pipeline_id}", project_path(project)),
            &[],
        )
        .await
    }

    pub async fn pipeline_jobs_json(&self, project: &str, pipeline_id: u64) -> GitLabResult<Vec<Value>> {
        self.get_paginated(
            &format!("{}/pipelines/{pipeline_id}/jobs", project_path(project)),
            &[],
        )
        .await
    }

    /// Plain-text job trace. Uses the same auth header as every other call.
    pub async fn job_log(&self, project: &str, job_id: u64) -> GitLabResult<String> {
        self.get_text(&format!("{}/jobs/{job_id}/trace", project_path(project)), &[])
            .await
    }

    // ----- issues -----

    pub async fn issues_json(
        &self,
        project: &str,
        state: Option<&str>,
        labels: Option<&str>,
    ) -> GitLabResult<Vec<Value>> {
        let mut q = vec![("per_page", RECENT_PAGE_SIZE.to_string())];
        if let Some(s) = state {
            q.push(("state", s.to_string()));
        }
        if let Some(l) = labels {
            q.push(("labels", l.to_string()));
        }
        self.get_json(&format!("{}/issues", project_path(project)), &q)
            .await
    }

    pub async fn issue_json(&self, project: &str, issue_iid: u64) -> GitLabResult<Value> {
        self.get_json(&format!("{}/issues/{issue_iid}", project_path(project)), &[])
            .await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> GitLabResult<T> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn project_path(project: &str) -> String {
    format!("/projects/{}", urlencoding::encode(project.trim()))
}

fn mr_path(id: &ChangeRequestId, suffix: &str) -> String {
    format!("{}/merge_requests/{}{}", project_path(&id.project), id.iid, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_paths_are_url_encoded() {
        assert_eq!(project_path("group/sub/proj"), "/projects/group%2Fsub%2Fproj");
        assert_eq!(project_path(" 42 "), "/projects/42");
        let id = ChangeRequestId::new("g/p", 7);
        assert_eq!(mr_path(&id, "/notes/3"), "/projects/g%2Fp/merge_requests/7/notes/3");
    }
}
