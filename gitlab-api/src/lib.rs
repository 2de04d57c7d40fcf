//! GitLab REST v4 access for the review tool server.
//!
//! - [`config`]: immutable connection settings (base URL, token, auth header strategy).
//! - [`client`]: one generic request function plus thin endpoint helpers.
//! - [`types`]: lenient typed views of the resources the review core reasons about.
//! - [`errors`]: status-aware error taxonomy shared by every caller.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

pub use client::GitLabClient;
pub use config::{AuthStrategy, GitLabConfig};
pub use errors::{ConfigError, GitLabError, GitLabResult, ProviderError};
pub use types::*;
