//! Fork manager: copies a document into a new, independently owned document
//! that remembers where it came from.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{queries, Database};
use crate::errors::ForkError;
use crate::models::{AuditAction, Document, Fork, NewDocument, Visibility};
use crate::store::{AccessPolicy, DocumentStore};

/// Result of a successful fork.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkResult {
    pub fork_note: Document,
    pub fork: Fork,
}

pub struct ForkManager {
    db: Arc<Database>,
}

impl ForkManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fork `original_document_id` on behalf of `user_id`.
    ///
    /// The caller must be able to read the original. The copy is private,
    /// owned by the caller, has no collaborators, and carries the original's
    /// content as of this call. The new document and its [`Fork`] record are
    /// written in one transaction.
    pub fn fork(&self, original_document_id: &str, user_id: &str) -> Result<ForkResult, ForkError> {
        let result = self.db.transaction(|conn| {
            let original = conn
                .get_document(original_document_id)?
                .ok_or_else(|| ForkError::NotFound(original_document_id.to_string()))?;
            if !conn.can_view(user_id, &original)? {
                warn!(document_id = original_document_id, user_id, "fork denied");
                return Err(ForkError::Forbidden {
                    id: original.id,
                    user_id: user_id.to_string(),
                });
            }

            let fork_note = conn.create_document(&NewDocument {
                title: format!("{} (fork)", original.title),
                owner_id: user_id.to_string(),
                content: original.content.clone(),
                visibility: Visibility::Private,
                forked_from_id: Some(original.id.clone()),
            })?;

            let fork = Fork {
                id: Uuid::new_v4().to_string(),
                original_document_id: original.id.clone(),
                fork_document_id: fork_note.id.clone(),
                forked_by_id: user_id.to_string(),
                created_at: Utc::now(),
            };
            queries::insert_fork(conn, &fork)?;
            queries::insert_audit(
                conn,
                AuditAction::Fork,
                user_id,
                None,
                Some(&original.id),
                Some(&format!("forked into {}", fork_note.id)),
            )?;

            Ok::<_, ForkError>(ForkResult { fork_note, fork })
        })?;

        info!(
            document_id = original_document_id,
            fork_id = %result.fork_note.id,
            user_id,
            "document forked"
        );
        Ok(result)
    }

    /// Every fork taken from `document_id`, oldest first.
    pub fn list_forks_of(&self, document_id: &str) -> Result<Vec<Fork>, ForkError> {
        Ok(self.db.list_forks_of(document_id)?)
    }
}
