//! Pull request state machine.
//!
//! ```text
//!            attempt_merge (clean) / resolve
//!   open ───────────────────────────────────▶ merged
//!    │ ▲
//!    │ └── attempt_merge (conflicts): stays open, conflicts recorded
//!    │
//!    └──────────────── close ───────────────▶ closed
//! ```
//!
//! Snapshots are frozen at creation. Every merge attempt re-reads the live
//! target. Finalization writes the target content and the PR status in one
//! transaction, guarded by the PR version and (for automatic merges) the
//! target version read before the merge was computed, so concurrent attempts
//! finalize at most once.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::resolution::validate_resolved_content;
use crate::db::{queries, Database};
use crate::errors::PullRequestError;
use crate::merge::{MergeOutcome, Merger};
use crate::models::{
    AuditAction, Document, PrStatus, PullRequest, SourceSnapshot, TargetSnapshot,
};
use crate::store::{AccessPolicy, DocumentStore};

/// Input for [`PullRequestService::create`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePullRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "sourceNoteId")]
    pub source_document_id: String,
    /// Overrides the source document's current content as the snapshot.
    #[serde(default)]
    pub source_content: Option<String>,
    #[serde(rename = "targetNoteId")]
    pub target_document_id: String,
}

/// A finalized merge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSuccess {
    pub pr: PullRequest,
    pub merged_content: String,
}

/// A pull request plus what a reviewer needs to judge it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDetails {
    #[serde(flatten)]
    pub pr: PullRequest,
    /// `None` when the target document no longer exists.
    pub current_target_content: Option<String>,
    /// Dry-run result for open pull requests with a live target.
    pub mergeable: Option<bool>,
}

/// Unified diffs for review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDiff {
    /// Base snapshot to source snapshot.
    pub source_patch: String,
    /// Base snapshot to the live target.
    pub target_patch: String,
}

/// State read before a merge is computed.
struct MergeInputs {
    pr: PullRequest,
    target: Document,
}

pub struct PullRequestService {
    db: Arc<Database>,
    merger: Merger,
}

impl PullRequestService {
    pub fn new(db: Arc<Database>, merger: Merger) -> Self {
        Self { db, merger }
    }

    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    // -- create -------------------------------------------------------------

    /// Open a pull request from `source_document_id` into
    /// `target_document_id`, snapshotting both sides.
    pub fn create(
        &self,
        author_id: &str,
        request: CreatePullRequest,
    ) -> Result<PullRequest, PullRequestError> {
        let pr = self.db.transaction(|conn| {
            let source = require_document(conn, &request.source_document_id)?;
            let target = require_document(conn, &request.target_document_id)?;
            for doc in [&source, &target] {
                if !conn.can_view(author_id, doc)? {
                    warn!(document_id = %doc.id, user_id = author_id, "pull request create denied");
                    return Err(PullRequestError::DocumentForbidden {
                        document_id: doc.id.clone(),
                        user_id: author_id.to_string(),
                    });
                }
            }

            let title = request.title.trim();
            if title.is_empty() {
                return Err(PullRequestError::Validation("title must not be empty".into()));
            }

            let pr = PullRequest {
                id: Uuid::new_v4().to_string(),
                title: title.to_string(),
                description: request.description.clone(),
                author_id: author_id.to_string(),
                source: SourceSnapshot {
                    document_id: source.id.clone(),
                    content: request.source_content.clone().unwrap_or(source.content),
                },
                target: TargetSnapshot {
                    document_id: target.id.clone(),
                    base_content: target.content,
                },
                status: PrStatus::Open,
                merge_conflicts: None,
                created_at: Utc::now(),
                merged_at: None,
                closed_at: None,
                version: 1,
            };
            queries::insert_pull_request(conn, &pr)?;
            queries::insert_audit(
                conn,
                AuditAction::PrCreated,
                author_id,
                Some(&pr.id),
                Some(&pr.target.document_id),
                Some(&pr.title),
            )?;
            Ok(pr)
        })?;

        info!(
            pr_id = %pr.id,
            source = %pr.source.document_id,
            target = %pr.target.document_id,
            user_id = author_id,
            "pull request opened"
        );
        Ok(pr)
    }

    // -- attempt_merge ------------------------------------------------------

    /// Try to merge automatically.
    ///
    /// Clean merges finalize and return the merged text. Conflicts are
    /// recorded on the still-open pull request and returned as
    /// [`PullRequestError::ConflictDetected`].
    pub fn attempt_merge(
        &self,
        pr_id: &str,
        user_id: &str,
    ) -> Result<MergeSuccess, PullRequestError> {
        let MergeInputs { pr, target } = self.load_for_merge(pr_id, user_id)?;

        let result = self.merger.merge_text(
            &pr.target.base_content,
            &target.content,
            &pr.source.content,
        );

        match result.into_outcome() {
            MergeOutcome::Clean(lines) => {
                let merged = crate::merge::join_lines(&lines);
                let pr = self.finalize(&pr, user_id, &merged, Some(target.version), AuditAction::Merged)?;
                info!(pr_id, user_id, "pull request merged automatically");
                Ok(MergeSuccess {
                    pr,
                    merged_content: merged,
                })
            }
            MergeOutcome::Conflicted { hunks, .. } => {
                self.db.transaction(|conn| {
                    if !queries::record_merge_conflicts(conn, &pr.id, &hunks, pr.version)? {
                        return Err(lost_race(conn, &pr)?);
                    }
                    queries::insert_audit(
                        conn,
                        AuditAction::MergeConflict,
                        user_id,
                        Some(&pr.id),
                        Some(&target.id),
                        Some(&format!("{} conflict hunk(s)", hunks.len())),
                    )?;
                    Ok::<_, PullRequestError>(())
                })?;
                info!(pr_id, user_id, hunks = hunks.len(), "merge attempt found conflicts");
                Err(PullRequestError::ConflictDetected(hunks))
            }
        }
    }

    // -- resolve ------------------------------------------------------------

    /// Finalize with a human-resolved text, bypassing the merge engine.
    pub fn resolve(
        &self,
        pr_id: &str,
        user_id: &str,
        resolved_content: &str,
    ) -> Result<MergeSuccess, PullRequestError> {
        let pr = {
            let conn = self.db.conn();
            require_pull_request(&conn, pr_id)?
        };
        validate_resolved_content(resolved_content)?;
        let MergeInputs { pr, .. } = self.authorize_merge(pr, user_id)?;

        let pr = self.finalize(&pr, user_id, resolved_content, None, AuditAction::Resolved)?;
        info!(pr_id, user_id, "pull request merged with manual resolution");
        Ok(MergeSuccess {
            pr,
            merged_content: resolved_content.to_string(),
        })
    }

    // -- close --------------------------------------------------------------

    /// Close without merging. Target owner or PR author only.
    pub fn close(&self, pr_id: &str, user_id: &str) -> Result<PullRequest, PullRequestError> {
        let pr = self.db.transaction(|conn| {
            let pr = require_pull_request(conn, pr_id)?;
            ensure_open(&pr)?;
            let target = require_document(conn, &pr.target.document_id)?;
            if !conn.is_owner(user_id, &target) && pr.author_id != user_id {
                warn!(pr_id, user_id, "close denied");
                return Err(forbidden(&pr, user_id, "close"));
            }

            if !queries::mark_closed(conn, &pr.id, pr.version, Utc::now())? {
                return Err(lost_race(conn, &pr)?);
            }
            queries::insert_audit(
                conn,
                AuditAction::Closed,
                user_id,
                Some(&pr.id),
                Some(&target.id),
                None,
            )?;
            require_pull_request(conn, pr_id)
        })?;

        info!(pr_id, user_id, "pull request closed");
        Ok(pr)
    }

    // -- reads --------------------------------------------------------------

    pub fn get(&self, pr_id: &str) -> Result<PullRequest, PullRequestError> {
        require_pull_request(&self.db.conn(), pr_id)
    }

    /// The pull request, the live target content, and whether an automatic
    /// merge would succeed right now.
    pub fn get_details(&self, pr_id: &str) -> Result<PullRequestDetails, PullRequestError> {
        let (pr, target) = {
            let conn = self.db.conn();
            let pr = require_pull_request(&conn, pr_id)?;
            let target = conn.get_document(&pr.target.document_id)?;
            (pr, target)
        };

        let current_target_content = target.map(|doc| doc.content);
        let mergeable = match (&current_target_content, pr.is_open()) {
            (Some(current), true) => Some(Merger::can_auto_merge(
                &pr.target.base_content,
                current,
                &pr.source.content,
            )),
            _ => None,
        };

        Ok(PullRequestDetails {
            pr,
            current_target_content,
            mergeable,
        })
    }

    /// Open pull requests targeting documents owned by `user_id`.
    pub fn list_pending(&self, user_id: &str) -> Result<Vec<PullRequest>, PullRequestError> {
        Ok(queries::list_open_for_owner(&self.db.conn(), user_id)?)
    }

    /// Review diffs against the frozen base.
    pub fn diff(&self, pr_id: &str) -> Result<PullRequestDiff, PullRequestError> {
        let (pr, target) = {
            let conn = self.db.conn();
            let pr = require_pull_request(&conn, pr_id)?;
            let target = require_document(&conn, &pr.target.document_id)?;
            (pr, target)
        };

        let base = pr.target.base_content.as_str();
        Ok(PullRequestDiff {
            source_patch: diffy::create_patch(base, &pr.source.content).to_string(),
            target_patch: diffy::create_patch(base, &target.content).to_string(),
        })
    }

    // -- internals ----------------------------------------------------------

    fn load_for_merge(&self, pr_id: &str, user_id: &str) -> Result<MergeInputs, PullRequestError> {
        let pr = require_pull_request(&self.db.conn(), pr_id)?;
        self.authorize_merge(pr, user_id)
    }

    /// Status, target existence and editor checks shared by merge and
    /// resolve, in that order.
    fn authorize_merge(
        &self,
        pr: PullRequest,
        user_id: &str,
    ) -> Result<MergeInputs, PullRequestError> {
        ensure_open(&pr)?;
        let conn = self.db.conn();
        let target = require_document(&conn, &pr.target.document_id)?;
        if !conn.is_editor(user_id, &target)? {
            warn!(pr_id = %pr.id, user_id, "merge denied");
            return Err(forbidden(&pr, user_id, "merge"));
        }
        Ok(MergeInputs { pr, target })
    }

    /// Write `content` to the target and mark the pull request merged, in one
    /// transaction. `target_version` guards the content write.
    fn finalize(
        &self,
        pr: &PullRequest,
        user_id: &str,
        content: &str,
        target_version: Option<i64>,
        action: AuditAction,
    ) -> Result<PullRequest, PullRequestError> {
        let target_id = pr.target.document_id.as_str();
        self.db.transaction(|conn| {
            if !queries::mark_merged(conn, &pr.id, pr.version, Utc::now())? {
                return Err(lost_race(conn, pr)?);
            }
            if !conn.set_content(target_id, content, target_version)? {
                warn!(pr_id = %pr.id, document_id = target_id, "target changed during merge");
                return Err(PullRequestError::StaleTarget {
                    id: pr.id.clone(),
                    document_id: target_id.to_string(),
                });
            }
            queries::insert_audit(conn, action, user_id, Some(&pr.id), Some(target_id), None)?;
            debug!(pr_id = %pr.id, document_id = target_id, "finalized pull request");
            require_pull_request(conn, &pr.id)
        })
    }
}

fn require_pull_request(conn: &Connection, pr_id: &str) -> Result<PullRequest, PullRequestError> {
    queries::get_pull_request(conn, pr_id)?
        .ok_or_else(|| PullRequestError::NotFound(pr_id.to_string()))
}

fn require_document(conn: &Connection, id: &str) -> Result<Document, PullRequestError> {
    conn.get_document(id)?
        .ok_or_else(|| PullRequestError::DocumentNotFound(id.to_string()))
}

fn ensure_open(pr: &PullRequest) -> Result<(), PullRequestError> {
    if pr.is_open() {
        Ok(())
    } else {
        Err(PullRequestError::InvalidState {
            id: pr.id.clone(),
            status: pr.status,
        })
    }
}

fn forbidden(pr: &PullRequest, user_id: &str, action: &'static str) -> PullRequestError {
    PullRequestError::Forbidden {
        id: pr.id.clone(),
        user_id: user_id.to_string(),
        action,
    }
}

/// Explain why a version-guarded write on `pr` matched no row.
fn lost_race(conn: &Connection, pr: &PullRequest) -> Result<PullRequestError, PullRequestError> {
    let current = require_pull_request(conn, &pr.id)?;
    warn!(pr_id = %pr.id, status = %current.status, "pull request changed concurrently");
    if current.is_open() {
        Ok(PullRequestError::ConcurrentUpdate { id: pr.id.clone() })
    } else {
        Ok(PullRequestError::InvalidState {
            id: pr.id.clone(),
            status: current.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::list_audit_for_pull_request;
    use crate::models::{Access, NewDocument, Visibility};

    struct Fixture {
        db: Arc<Database>,
        service: PullRequestService,
        target: Document,
        source: Document,
    }

    fn fixture(base: &str, source: &str) -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let (target, source) = {
            let conn = db.conn();
            let target = conn
                .create_document(&NewDocument {
                    title: "Original".into(),
                    owner_id: "alice".into(),
                    content: base.into(),
                    visibility: Visibility::Public,
                    forked_from_id: None,
                })
                .unwrap();
            let source = conn
                .create_document(&NewDocument {
                    title: "Original (fork)".into(),
                    owner_id: "bob".into(),
                    content: source.into(),
                    visibility: Visibility::Private,
                    forked_from_id: Some(target.id.clone()),
                })
                .unwrap();
            (target, source)
        };
        let service = PullRequestService::new(db.clone(), Merger::default());
        Fixture {
            db,
            service,
            target,
            source,
        }
    }

    fn request(f: &Fixture) -> CreatePullRequest {
        CreatePullRequest {
            title: "Improve".into(),
            description: "desc".into(),
            source_document_id: f.source.id.clone(),
            source_content: None,
            target_document_id: f.target.id.clone(),
        }
    }

    fn content(f: &Fixture, id: &str) -> String {
        f.db.get_document(id).unwrap().unwrap().content
    }

    #[test]
    fn test_create_snapshots_both_sides() {
        let f = fixture("a\nb", "a\nB");
        let pr = f.service.create("bob", request(&f)).unwrap();
        assert_eq!(pr.status, PrStatus::Open);
        assert_eq!(pr.source.content, "a\nB");
        assert_eq!(pr.target.base_content, "a\nb");
        assert_eq!(pr.author_id, "bob");
        assert!(pr.merge_conflicts.is_none());
    }

    #[test]
    fn test_create_uses_supplied_source_content() {
        let f = fixture("a", "b");
        let mut req = request(&f);
        req.source_content = Some("override".into());
        let pr = f.service.create("bob", req).unwrap();
        assert_eq!(pr.source.content, "override");
    }

    #[test]
    fn test_create_validation_and_missing_documents() {
        let f = fixture("a", "b");
        let mut req = request(&f);
        req.title = "   ".into();
        assert!(matches!(
            f.service.create("bob", req),
            Err(PullRequestError::Validation(_))
        ));

        let mut req = request(&f);
        req.target_document_id = "missing".into();
        assert!(matches!(
            f.service.create("bob", req),
            Err(PullRequestError::DocumentNotFound(ref id)) if id == "missing"
        ));
        assert!(f.db.list_pull_requests(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_create_requires_read_access() {
        let f = fixture("a", "private draft");
        // The source is bob's private fork.
        let err = f.service.create("mallory", request(&f)).unwrap_err();
        assert!(matches!(
            err,
            PullRequestError::DocumentForbidden { ref document_id, .. } if *document_id == f.source.id
        ));

        // A private target is checked too.
        let hidden = f
            .db
            .conn()
            .create_document(&NewDocument {
                title: "Hidden".into(),
                owner_id: "alice".into(),
                content: "s3cret".into(),
                visibility: Visibility::Private,
                forked_from_id: None,
            })
            .unwrap();
        let mut req = request(&f);
        req.target_document_id = hidden.id.clone();
        assert!(matches!(
            f.service.create("bob", req),
            Err(PullRequestError::DocumentForbidden { ref document_id, .. }) if *document_id == hidden.id
        ));
        assert!(f.db.list_pull_requests(None, 10).unwrap().is_empty());

        // A view collaborator on the source may open one.
        queries::upsert_collaborator(&f.db.conn(), &f.source.id, "carol", Access::View).unwrap();
        assert!(f.service.create("carol", request(&f)).is_ok());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.source.id, "changed later", None).unwrap();
        assert_eq!(f.service.get(&pr.id).unwrap().source.content, "b");
    }

    #[test]
    fn test_clean_merge_finalizes() {
        let f = fixture("A\nB\nC", "A\nX\nC");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB\nY", None).unwrap();

        let merged = f.service.attempt_merge(&pr.id, "alice").unwrap();
        assert_eq!(merged.merged_content, "A\nX\nY");
        assert_eq!(merged.pr.status, PrStatus::Merged);
        assert!(merged.pr.merged_at.is_some());
        assert!(merged.pr.merge_conflicts.is_none());
        assert_eq!(content(&f, &f.target.id), "A\nX\nY");
    }

    #[test]
    fn test_conflict_keeps_pr_open_and_target_untouched() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();

        let err = f.service.attempt_merge(&pr.id, "alice").unwrap_err();
        let hunks = match err {
            PullRequestError::ConflictDetected(hunks) => hunks,
            other => panic!("expected conflict, got {other:?}"),
        };
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].source_lines, vec!["B1".to_string()]);

        let stored = f.service.get(&pr.id).unwrap();
        assert_eq!(stored.status, PrStatus::Open);
        assert_eq!(stored.merge_conflicts, Some(hunks));
        assert_eq!(content(&f, &f.target.id), "A\nB2");
    }

    #[test]
    fn test_retry_overwrites_stale_conflicts() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();
        assert!(f.service.attempt_merge(&pr.id, "alice").is_err());

        // Target owner reverts the conflicting edit; the retry merges cleanly.
        f.db.conn().set_content(&f.target.id, "A\nB", None).unwrap();
        let merged = f.service.attempt_merge(&pr.id, "alice").unwrap();
        assert_eq!(merged.merged_content, "A\nB1");
        assert!(merged.pr.merge_conflicts.is_none());
    }

    #[test]
    fn test_resolve_after_conflict() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();
        assert!(f.service.attempt_merge(&pr.id, "alice").is_err());

        let resolved = f.service.resolve(&pr.id, "alice", "A\nB1 and B2").unwrap();
        assert_eq!(resolved.pr.status, PrStatus::Merged);
        assert!(resolved.pr.merge_conflicts.is_none());
        assert_eq!(content(&f, &f.target.id), "A\nB1 and B2");
    }

    #[test]
    fn test_resolve_rejects_blank_content() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        for blank in ["", "   "] {
            assert!(matches!(
                f.service.resolve(&pr.id, "alice", blank),
                Err(PullRequestError::Validation(_))
            ));
        }
        assert_eq!(f.service.get(&pr.id).unwrap().status, PrStatus::Open);
        assert_eq!(content(&f, &f.target.id), "a");
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.service.attempt_merge(&pr.id, "alice").unwrap();
        let before = content(&f, &f.target.id);

        for result in [
            f.service.attempt_merge(&pr.id, "alice").map(|_| ()),
            f.service.resolve(&pr.id, "alice", "x").map(|_| ()),
            f.service.close(&pr.id, "alice").map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(PullRequestError::InvalidState { status: PrStatus::Merged, .. })
            ));
        }
        assert_eq!(content(&f, &f.target.id), before);

        let other = f.service.create("bob", request(&f)).unwrap();
        f.service.close(&other.id, "bob").unwrap();
        assert!(matches!(
            f.service.attempt_merge(&other.id, "alice"),
            Err(PullRequestError::InvalidState { status: PrStatus::Closed, .. })
        ));
    }

    #[test]
    fn test_merge_authorization() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();

        // The author does not own the target.
        assert!(matches!(
            f.service.attempt_merge(&pr.id, "bob"),
            Err(PullRequestError::Forbidden { .. })
        ));
        assert!(matches!(
            f.service.resolve(&pr.id, "mallory", "x"),
            Err(PullRequestError::Forbidden { .. })
        ));

        queries::upsert_collaborator(&f.db.conn(), &f.target.id, "carol", Access::Edit).unwrap();
        assert!(f.service.attempt_merge(&pr.id, "carol").is_ok());
    }

    #[test]
    fn test_close_authorization() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        assert!(matches!(
            f.service.close(&pr.id, "mallory"),
            Err(PullRequestError::Forbidden { .. })
        ));

        let closed = f.service.close(&pr.id, "bob").unwrap();
        assert_eq!(closed.status, PrStatus::Closed);
        assert!(closed.closed_at.is_some());
        assert_eq!(content(&f, &f.target.id), "a");
    }

    #[test]
    fn test_check_order() {
        let f = fixture("a", "b");
        assert!(matches!(
            f.service.resolve("nope", "alice", ""),
            Err(PullRequestError::NotFound(_))
        ));

        let pr = f.service.create("bob", request(&f)).unwrap();
        f.service.close(&pr.id, "bob").unwrap();
        // Validation runs before the status check for resolve.
        assert!(matches!(
            f.service.resolve(&pr.id, "mallory", " "),
            Err(PullRequestError::Validation(_))
        ));
        // Status runs before authorization.
        assert!(matches!(
            f.service.resolve(&pr.id, "mallory", "x"),
            Err(PullRequestError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_deleted_target() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn()
            .execute("DELETE FROM documents WHERE id = ?1", [&f.target.id])
            .unwrap();

        assert!(matches!(
            f.service.attempt_merge(&pr.id, "alice"),
            Err(PullRequestError::DocumentNotFound(_))
        ));
        let details = f.service.get_details(&pr.id).unwrap();
        assert!(details.current_target_content.is_none());
        assert!(details.mergeable.is_none());
    }

    #[test]
    fn test_details_and_pending() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();

        let details = f.service.get_details(&pr.id).unwrap();
        assert_eq!(details.current_target_content.as_deref(), Some("A\nB"));
        assert_eq!(details.mergeable, Some(true));

        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();
        assert_eq!(f.service.get_details(&pr.id).unwrap().mergeable, Some(false));

        let json = serde_json::to_value(f.service.get_details(&pr.id).unwrap()).unwrap();
        assert_eq!(json["currentTargetContent"], "A\nB2");
        assert_eq!(json["id"], pr.id.as_str());

        assert_eq!(f.service.list_pending("alice").unwrap().len(), 1);
        assert!(f.service.list_pending("bob").unwrap().is_empty());
    }

    #[test]
    fn test_diff() {
        let f = fixture("a\nb\n", "a\nc\n");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "z\na\nb\n", None).unwrap();

        let diff = f.service.diff(&pr.id).unwrap();
        assert!(diff.source_patch.contains("-b"));
        assert!(diff.source_patch.contains("+c"));
        assert!(diff.target_patch.contains("+z"));
    }

    #[test]
    fn test_finalize_guards_target_version() {
        let f = fixture("a", "b");
        let pr = f.service.create("bob", request(&f)).unwrap();
        let stale_version = f.target.version;
        f.db.conn().set_content(&f.target.id, "a", None).unwrap();

        let err = f
            .service
            .finalize(&pr, "alice", "b", Some(stale_version), AuditAction::Merged)
            .unwrap_err();
        assert!(matches!(err, PullRequestError::StaleTarget { .. }));
        // Rolled back: still open, target untouched.
        assert_eq!(f.service.get(&pr.id).unwrap().status, PrStatus::Open);
        assert_eq!(content(&f, &f.target.id), "a");
    }

    #[test]
    fn test_lost_race_to_conflict_recording() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();
        let current = f.db.get_document(&f.target.id).unwrap().unwrap();

        // Another attempt records conflicts and bumps the pull request version.
        assert!(matches!(
            f.service.attempt_merge(&pr.id, "alice"),
            Err(PullRequestError::ConflictDetected(_))
        ));

        // The target itself is unchanged, so this is not a stale target.
        let err = f
            .service
            .finalize(&pr, "alice", "A\nB3", Some(current.version), AuditAction::Merged)
            .unwrap_err();
        assert!(matches!(err, PullRequestError::ConcurrentUpdate { ref id } if *id == pr.id));
        assert_eq!(content(&f, &f.target.id), "A\nB2");
        assert_eq!(f.service.get(&pr.id).unwrap().status, PrStatus::Open);
    }

    #[test]
    fn test_audit_trail() {
        let f = fixture("A\nB", "A\nB1");
        let pr = f.service.create("bob", request(&f)).unwrap();
        f.db.conn().set_content(&f.target.id, "A\nB2", None).unwrap();
        let _ = f.service.attempt_merge(&pr.id, "alice");
        f.service.resolve(&pr.id, "alice", "A\nB3").unwrap();

        let actions: Vec<String> = list_audit_for_pull_request(&f.db.conn(), &pr.id)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["pr_created", "merge_conflict", "resolved"]);
    }
}
