//! MCP (stdio JSON-RPC) front end for the GitLab review tools.
//!
//! stdout carries the protocol; all logging must go to stderr.

pub mod error_handler;
pub mod params;
pub mod server;

use gitlab_api::{GitLabClient, GitLabConfig};
use mr_reviewer::ReviewConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;

pub use error_handler::{ToolError, ToolResult};
pub use server::GitLabMcp;

/// Builds the client and serves the tool catalog on stdin/stdout until the
/// peer disconnects.
pub async fn start(gitlab: GitLabConfig, review: ReviewConfig) -> anyhow::Result<()> {
    let client = GitLabClient::from_config(&gitlab)?;
    info!(
        "mcp: serving GitLab tools for {} (auth={})",
        gitlab.base_api, gitlab.auth
    );

    let service = GitLabMcp::new(client, review).serve(stdio()).await?;
    let reason = service.waiting().await?;
    info!("mcp: stopped ({reason:?})");
    Ok(())
}
