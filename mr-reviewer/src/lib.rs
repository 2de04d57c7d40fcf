//! Review core: duplicate-safe, anchored review comments on GitLab MRs.
//!
//! 1) **Anchoring** (`parser`)
//!    - First added line of a file diff, or of the first changed file
//!    - A caller-chosen line must sit on the new side of one of the file's hunks
//!
//! 2) **Suppression** (`ignore`, `signature`, `index`)
//!    - Human ignore markers silence a discussion for good
//!    - Same bot + same issue signature + same line → edit, don't repost
//!
//! 3) **Routing** (`router`)
//!    - skip / update / create-anchored / create-fallback, reads before writes
//!
//! 4) **Context** (`summary`)
//!    - Short digest of existing threads for the agent
//!
//! GitLab is reached through the [`backend::ReviewBackend`] seam: plain
//! `async fn`, static dispatch, no `async-trait` and no `Box<dyn ...>`.

pub mod backend;
pub mod config;
pub mod errors;
pub mod ignore;
pub mod index;
pub mod parser;
pub mod router;
pub mod signature;
pub mod summary;

pub use backend::ReviewBackend;
pub use config::{ReviewConfig, SummaryConfig};
pub use errors::{Error, MrResult, ParseError};
pub use index::{ActingIdentity, NoteReuse, TargetLine};
pub use router::{
    FallbackReason, Finding, Placement, ReviewCommentRouter, ReviewContext, RouteError,
    RouteOutcome, RoutePolicy,
};
pub use summary::{MrContext, load_mr_context, summarize};
