//! GitLab operations the review core depends on.
//!
//! Static dispatch only: the router is generic over `B: ReviewBackend`.
//! `GitLabClient` is the production implementation; tests plug in an
//! in-memory fake.

use std::future::Future;

use gitlab_api::{
    ChangeRequestId, GitLabClient, GitLabResult, MergeRequest, MrDiffFile, Position, UserRef,
};
use serde_json::Value;

pub trait ReviewBackend: Send + Sync {
    /// User owning the configured token.
    fn current_user(&self) -> impl Future<Output = GitLabResult<UserRef>> + Send;

    fn merge_request(
        &self,
        id: &ChangeRequestId,
    ) -> impl Future<Output = GitLabResult<MergeRequest>> + Send;

    fn merge_request_diffs(
        &self,
        id: &ChangeRequestId,
    ) -> impl Future<Output = GitLabResult<Vec<MrDiffFile>>> + Send;

    /// All discussions as raw payloads (every page up to the configured cap).
    /// Decoding is left to the caller so the ignore scan sees every entry.
    fn discussions(
        &self,
        id: &ChangeRequestId,
    ) -> impl Future<Output = GitLabResult<Vec<Value>>> + Send;

    fn create_discussion(
        &self,
        id: &ChangeRequestId,
        body: &str,
        position: Option<&Position>,
    ) -> impl Future<Output = GitLabResult<Value>> + Send;

    fn create_note(
        &self,
        id: &ChangeRequestId,
        body: &str,
    ) -> impl Future<Output = GitLabResult<Value>> + Send;

    fn update_note(
        &self,
        id: &ChangeRequestId,
        note_id: u64,
        body: &str,
    ) -> impl Future<Output = GitLabResult<Value>> + Send;
}

impl ReviewBackend for GitLabClient {
    async fn current_user(&self) -> GitLabResult<UserRef> {
        GitLabClient::current_user(self).await
    }

    async fn merge_request(&self, id: &ChangeRequestId) -> GitLabResult<MergeRequest> {
        GitLabClient::merge_request(self, id).await
    }

    async fn merge_request_diffs(&self, id: &ChangeRequestId) -> GitLabResult<Vec<MrDiffFile>> {
        GitLabClient::merge_request_diffs(self, id).await
    }

    async fn discussions(&self, id: &ChangeRequestId) -> GitLabResult<Vec<Value>> {
        GitLabClient::discussions_json(self, id).await
    }

    async fn create_discussion(
        &self,
        id: &ChangeRequestId,
        body: &str,
        position: Option<&Position>,
    ) -> GitLabResult<Value> {
        GitLabClient::create_discussion(self, id, body, position).await
    }

    async fn create_note(&self, id: &ChangeRequestId, body: &str) -> GitLabResult<Value> {
        GitLabClient::create_note(self, id, body).await
    }

    async fn update_note(
        &self,
        id: &ChangeRequestId,
        note_id: u64,
        body: &str,
    ) -> GitLabResult<Value> {
        GitLabClient::update_note(self, id, note_id, body).await
    }
}
