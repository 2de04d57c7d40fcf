use anyhow::Context;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt};

use gitlab_api::GitLabConfig;
use mr_reviewer::ReviewConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env next to the binary; real environment wins.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is the JSON-RPC channel: logs go to stderr, no colors.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .with_timer(ChronoUtc::rfc_3339()),
        )
        .init();

    let gitlab = GitLabConfig::from_env().context("invalid GitLab configuration")?;
    let review = ReviewConfig::from_env().context("invalid review configuration")?;

    if let Err(e) = mcp_server::start(gitlab, review).await {
        error!("server stopped with error: {e:#}");
        return Err(e);
    }
    Ok(())
}
