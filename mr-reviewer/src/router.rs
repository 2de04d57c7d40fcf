//! Review comment router: decides skip / update / create for one finding
//! and performs the single resulting write.
//!
//! Order per finding:
//!
//! 1. load MR, discussions and (unless a position is given) diffs; resolve
//!    the target line, checking a caller-chosen line against the diff
//! 2. ignore check: target inside an ignored discussion → `Skipped`
//! 3. reuse check (policy permitting): same author + signature → `Updated`
//! 4. build the anchor; on failure post a general note → `Created(Fallback)`
//! 5. create the inline discussion → `Created(Anchored)`
//!
//! Nothing is written before steps 2–3 have run. Upstream errors are not
//! retried; they come back as [`RouteError`] carrying the finding.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use gitlab_api::{ChangeRequestId, DiffRefs, Discussion, MergeRequest, POSITION_TYPE_TEXT, Position};

use crate::backend::ReviewBackend;
use crate::config::ReviewConfig;
use crate::errors::{Error, MrResult};
use crate::ignore::find_ignored_in_json;
use crate::index::{ActingIdentity, NoteReuse, TargetLine, decode_discussions, find_reusable_note};
use crate::parser::{DiffAnchor, first_added_line_in_diffs, locate_line_in_diffs};
use crate::signature::issue_signature;

/// Machine-readable prefix appended to fallback notes.
pub const FALLBACK_MARKER: &str = "<!-- mr-ai:anchor-fallback";

/// A review finding as handed in by the agent.
#[derive(Debug, Clone, Default)]
pub struct Finding {
    pub body: String,
    /// Requested file; `None` lets the router pick the first changed file.
    pub file_path: Option<String>,
    /// Requested new-side line; only used together with `file_path`.
    pub line: Option<u32>,
    /// Caller-computed position; wins over `file_path`/`line`.
    pub position: Option<Position>,
}

impl Finding {
    pub fn at_position(body: impl Into<String>, position: Position) -> Self {
        Self {
            body: body.into(),
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn auto(body: impl Into<String>, file_path: Option<String>, line: Option<u32>) -> Self {
        Self {
            body: body.into(),
            file_path,
            line,
            position: None,
        }
    }
}

/// Whether an existing note by the bot may be edited instead of creating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub reuse_existing: bool,
}

impl RoutePolicy {
    /// Automatic anchoring: duplicate suppression on.
    pub const AUTO: Self = Self {
        reuse_existing: true,
    };
    /// Caller-supplied position: always a new thread, ignore markers still apply.
    pub const EXPLICIT: Self = Self {
        reuse_existing: false,
    };
}

/// Why a finding could not be anchored inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// File is in the diff but has no added line.
    NoAddedLine { path: String },
    FileNotInDiff { path: String },
    /// File is in the diff but `line` is not an added or context line of it.
    LineNotInDiff { path: String, line: u32 },
    /// No changed file has an added line.
    NothingAdded,
    /// MR (or given position) lacks some of base/start/head SHA.
    MissingDiffRefs { missing: Vec<&'static str> },
    /// Position has no usable line or path.
    MalformedPosition,
}

impl FallbackReason {
    pub fn code(&self) -> &'static str {
        match self {
            FallbackReason::NoAddedLine { .. } => "no_added_line",
            FallbackReason::FileNotInDiff { .. } => "file_not_in_diff",
            FallbackReason::LineNotInDiff { .. } => "line_not_in_diff",
            FallbackReason::NothingAdded => "nothing_added",
            FallbackReason::MissingDiffRefs { .. } => "missing_diff_refs",
            FallbackReason::MalformedPosition => "malformed_position",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoAddedLine { path } => write!(f, "`{path}` has no added lines"),
            FallbackReason::FileNotInDiff { path } => {
                write!(f, "`{path}` is not part of this merge request diff")
            }
            FallbackReason::LineNotInDiff { path, line } => {
                write!(f, "line {line} of `{path}` is not part of this merge request diff")
            }
            FallbackReason::NothingAdded => f.write_str("the diff has no added lines"),
            FallbackReason::MissingDiffRefs { missing } => {
                write!(f, "diff refs are incomplete (missing {})", missing.join(", "))
            }
            FallbackReason::MalformedPosition => f.write_str("the position has no usable line"),
        }
    }
}

/// Where a created comment ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    Anchored { target: TargetLine },
    Fallback { reason: FallbackReason },
}

/// Result of routing one finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Target sits in an ignored discussion; nothing was written.
    Skipped { discussion_id: String },
    Updated {
        discussion_id: String,
        note_id: u64,
        note: Value,
    },
    Created {
        #[serde(flatten)]
        placement: Placement,
        created: Value,
    },
}

/// A failed route, carrying the finding that was not posted.
#[derive(Debug, Error)]
#[error("failed to post finding: {source}")]
pub struct RouteError {
    pub finding: String,
    pub target: Option<TargetLine>,
    #[source]
    pub source: Error,
}

impl RouteError {
    pub fn status(&self) -> Option<u16> {
        self.source.status()
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Per-call snapshot of the MR state the router decides on.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub merge_request: MergeRequest,
    pub discussions: Vec<Discussion>,
    /// Marker-ignored ids ∪ configured ids.
    pub ignored: HashSet<String>,
    /// `None` when reuse is off or the bot user could not be determined.
    pub acting: Option<ActingIdentity>,
}

/// Reads MR metadata and discussions, and resolves the acting identity when
/// `with_identity` is set.
///
/// A failing `GET /user` only disables reuse (logged); MR or discussion
/// failures are errors.
pub async fn load_review_context<B: ReviewBackend>(
    backend: &B,
    id: &ChangeRequestId,
    cfg: &ReviewConfig,
    with_identity: bool,
) -> MrResult<ReviewContext> {
    debug!("router: load MR {}!{}", id.project, id.iid);
    let merge_request = backend.merge_request(id).await?;
    let raw = backend.discussions(id).await?;
    let discussions = decode_discussions(&raw);

    let mut ignored = find_ignored_in_json(&raw);
    ignored.extend(cfg.env_ignored.iter().cloned());

    let acting = if !with_identity {
        None
    } else if let Some(identity) = cfg.bot_identity.clone() {
        Some(identity)
    } else {
        match backend.current_user().await {
            Ok(user) => Some(ActingIdentity::from(&user)),
            Err(e) => {
                warn!("router: cannot resolve acting user, reuse disabled: {e}");
                None
            }
        }
    };

    debug!(
        "router: context discussions={} ignored={} acting={:?}",
        discussions.len(),
        ignored.len(),
        acting
    );
    Ok(ReviewContext {
        merge_request,
        discussions,
        ignored,
        acting,
    })
}

/// Routes findings for one merge request through a backend.
pub struct ReviewCommentRouter<'a, B> {
    backend: &'a B,
    cfg: &'a ReviewConfig,
}

impl<'a, B: ReviewBackend> ReviewCommentRouter<'a, B> {
    pub fn new(backend: &'a B, cfg: &'a ReviewConfig) -> Self {
        Self { backend, cfg }
    }

    /// Loads a fresh context and routes `finding`.
    pub async fn post_finding(
        &self,
        id: &ChangeRequestId,
        finding: &Finding,
        policy: RoutePolicy,
    ) -> Result<RouteOutcome, RouteError> {
        let fail = |target: Option<TargetLine>, source: Error| RouteError {
            finding: finding.body.clone(),
            target,
            source,
        };

        if finding.body.trim().is_empty() {
            return Err(fail(None, Error::Validation("finding body is empty".into())));
        }

        let ctx = load_review_context(self.backend, id, self.cfg, policy.reuse_existing)
            .await
            .map_err(|e| fail(None, e))?;
        self.route(id, &ctx, finding, policy).await
    }

    /// Routes `finding` against an already loaded context.
    pub async fn route(
        &self,
        id: &ChangeRequestId,
        ctx: &ReviewContext,
        finding: &Finding,
        policy: RoutePolicy,
    ) -> Result<RouteOutcome, RouteError> {
        let fail = |target: Option<TargetLine>, source: Error| RouteError {
            finding: finding.body.clone(),
            target,
            source,
        };

        // 1. target (reads only)
        let target = self
            .resolve_target(id, finding)
            .await
            .map_err(|e| fail(None, e))?;
        debug!("router: target={:?}", target);

        if let Ok(t) = &target {
            // 2. ignore, 3. reuse
            let signature = if policy.reuse_existing && ctx.acting.is_some() {
                issue_signature(&finding.body)
            } else {
                String::new()
            };
            let acting = ctx.acting.clone().unwrap_or_default();
            match find_reusable_note(&ctx.discussions, &acting, t, &signature, &ctx.ignored) {
                Some(NoteReuse::Ignored { discussion_id }) => {
                    info!(
                        "router: skipped {}:{} (discussion {} is ignored)",
                        t.path, t.line, discussion_id
                    );
                    return Ok(RouteOutcome::Skipped { discussion_id });
                }
                Some(NoteReuse::Update {
                    discussion_id,
                    note_id,
                }) => {
                    let note = self
                        .backend
                        .update_note(id, note_id, &finding.body)
                        .await
                        .map_err(|e| fail(Some(t.clone()), e.into()))?;
                    info!(
                        "router: updated note {} in discussion {} at {}:{}",
                        note_id, discussion_id, t.path, t.line
                    );
                    return Ok(RouteOutcome::Updated {
                        discussion_id,
                        note_id,
                        note,
                    });
                }
                None => {}
            }
        }

        // 4. anchor
        let anchor = target.and_then(|t| {
            build_position(finding.position.as_ref(), ctx.merge_request.diff_refs.as_ref(), &t)
                .map(|p| (t, p))
        });

        match anchor {
            Ok((t, position)) => {
                // 5. anchored create
                let created = self
                    .backend
                    .create_discussion(id, &finding.body, Some(&position))
                    .await
                    .map_err(|e| fail(Some(t.clone()), e.into()))?;
                info!("router: created discussion at {}:{}", t.path, t.line);
                Ok(RouteOutcome::Created {
                    placement: Placement::Anchored { target: t },
                    created,
                })
            }
            Err(reason) => {
                warn!("router: anchor unavailable ({}), posting general note", reason.code());
                let body = fallback_body(&finding.body, &reason);
                let created = self
                    .backend
                    .create_note(id, &body)
                    .await
                    .map_err(|e| fail(None, e.into()))?;
                Ok(RouteOutcome::Created {
                    placement: Placement::Fallback { reason },
                    created,
                })
            }
        }
    }

    async fn resolve_target(
        &self,
        id: &ChangeRequestId,
        finding: &Finding,
    ) -> MrResult<Result<TargetLine, FallbackReason>> {
        if let Some(p) = &finding.position {
            return Ok(match (p.is_well_formed(), p.path(), p.line()) {
                (true, Some(path), Some(line)) => Ok(TargetLine::new(path, line)),
                _ => Err(FallbackReason::MalformedPosition),
            });
        }

        let path = finding
            .file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        if path.is_some() && finding.line == Some(0) {
            return Ok(Err(FallbackReason::MalformedPosition));
        }
        if path.is_none() && finding.line.is_some() {
            debug!("router: line without file path, picking first changed file");
        }

        let files = self.backend.merge_request_diffs(id).await?;
        let anchor = match (path, finding.line) {
            (Some(path), Some(line)) => locate_line_in_diffs(&files, path, line),
            (path, _) => first_added_line_in_diffs(&files, path),
        };
        Ok(match anchor {
            DiffAnchor::Line {
                path,
                old_path,
                line,
            } => Ok(TargetLine::new(path, line).renamed_from(&old_path)),
            DiffAnchor::NoAddedLine { path } => Err(FallbackReason::NoAddedLine { path }),
            DiffAnchor::FileNotInDiff { path } => Err(FallbackReason::FileNotInDiff { path }),
            DiffAnchor::LineNotInDiff { path, line } => {
                Err(FallbackReason::LineNotInDiff { path, line })
            }
            DiffAnchor::NothingAdded => Err(FallbackReason::NothingAdded),
        })
    }
}

/// Inline position for `target`.
///
/// An explicit position keeps its own SHAs (and must carry all three);
/// otherwise the MR's `diff_refs` are used.
pub fn build_position(
    explicit: Option<&Position>,
    mr_refs: Option<&DiffRefs>,
    target: &TargetLine,
) -> Result<Position, FallbackReason> {
    if let Some(p) = explicit {
        if !p.is_well_formed() {
            return Err(FallbackReason::MalformedPosition);
        }
        let missing = p.diff_refs().missing();
        if !missing.is_empty() {
            return Err(FallbackReason::MissingDiffRefs { missing });
        }
        let mut position = p.clone();
        if position.position_type.is_none() {
            position.position_type = Some(POSITION_TYPE_TEXT.to_string());
        }
        return Ok(position);
    }

    let refs = mr_refs.cloned().unwrap_or_default();
    let missing = refs.missing();
    if !missing.is_empty() {
        return Err(FallbackReason::MissingDiffRefs { missing });
    }
    let mut position = Position::text_on_new_line(&refs, &target.path, target.line);
    if let Some(old_path) = &target.old_path {
        position.old_path = Some(old_path.clone());
    }
    Ok(position)
}

/// Finding text plus the machine-readable reason and a short explanation.
pub fn fallback_body(body: &str, reason: &FallbackReason) -> String {
    format!(
        "{}\n\n{} reason={} -->\n_Posted as a general comment: {}._",
        body.trim_end(),
        FALLBACK_MARKER,
        reason.code(),
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> DiffRefs {
        DiffRefs {
            base_sha: Some("b".into()),
            start_sha: Some("s".into()),
            head_sha: Some("h".into()),
        }
    }

    #[test]
    fn position_from_mr_refs() {
        let p = build_position(None, Some(&refs()), &TargetLine::new("a.rs", 3)).unwrap();
        assert_eq!(p.position_type.as_deref(), Some("text"));
        assert_eq!(p.new_line, Some(3));
        assert_eq!(p.start_sha.as_deref(), Some("s"));
    }

    #[test]
    fn missing_start_sha_is_a_fallback_reason() {
        let mut r = refs();
        r.start_sha = None;
        assert_eq!(
            build_position(None, Some(&r), &TargetLine::new("a.rs", 3)),
            Err(FallbackReason::MissingDiffRefs {
                missing: vec!["start_sha"]
            })
        );
        assert!(matches!(
            build_position(None, None, &TargetLine::new("a.rs", 3)),
            Err(FallbackReason::MissingDiffRefs { .. })
        ));
    }

    #[test]
    fn explicit_position_keeps_its_shas() {
        let mut explicit = Position::text_on_new_line(&refs(), "x.rs", 9);
        explicit.position_type = None;
        let p = build_position(Some(&explicit), None, &TargetLine::new("x.rs", 9)).unwrap();
        assert_eq!(p.head_sha.as_deref(), Some("h"));
        assert_eq!(p.position_type.as_deref(), Some("text"));

        explicit.head_sha = Some(" ".into());
        assert!(matches!(
            build_position(Some(&explicit), Some(&refs()), &TargetLine::new("x.rs", 9)),
            Err(FallbackReason::MissingDiffRefs { .. })
        ));
    }

    #[test]
    fn renamed_target_keeps_its_old_path() {
        let target = TargetLine::new("new/name.rs", 4).renamed_from("old/name.rs");
        let p = build_position(None, Some(&refs()), &target).unwrap();
        assert_eq!(p.new_path.as_deref(), Some("new/name.rs"));
        assert_eq!(p.old_path.as_deref(), Some("old/name.rs"));

        let p = build_position(None, Some(&refs()), &TargetLine::new("a.rs", 3)).unwrap();
        assert_eq!(p.old_path.as_deref(), Some("a.rs"));
    }

    #[test]
    fn fallback_body_carries_text_and_reason() {
        let body = fallback_body(
            "Null ref\n",
            &FallbackReason::MissingDiffRefs {
                missing: vec!["start_sha"],
            },
        );
        assert!(body.starts_with("Null ref\n\n"));
        assert!(body.contains("<!-- mr-ai:anchor-fallback reason=missing_diff_refs -->"));
        assert!(body.contains("missing start_sha"));
    }

    #[test]
    fn outcome_serializes_with_tags() {
        let v = serde_json::to_value(RouteOutcome::Created {
            placement: Placement::Fallback {
                reason: FallbackReason::NothingAdded,
            },
            created: Value::Null,
        })
        .unwrap();
        assert_eq!(v["outcome"], "created");
        assert_eq!(v["placement"], "fallback");
        assert_eq!(v["reason"]["kind"], "nothing_added");
    }
}
