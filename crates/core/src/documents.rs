//! Direct document operations: create, read, edit, share.
//!
//! This is the minimal document surface the fork and pull request services
//! need around them. It is not a general note editor.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{queries, Database};
use crate::errors::DocumentError;
use crate::models::{Access, AuditAction, Collaborator, Document, NewDocument, Visibility};
use crate::store::{AccessPolicy, DocumentStore};

pub struct DocumentService {
    db: Arc<Database>,
}

impl DocumentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a document owned by `owner_id`.
    pub fn create(
        &self,
        owner_id: &str,
        title: &str,
        content: &str,
        visibility: Visibility,
    ) -> Result<Document, DocumentError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DocumentError::Validation("title must not be empty".into()));
        }

        let doc = self.db.transaction(|conn| {
            let doc = conn.create_document(&NewDocument {
                title: title.to_string(),
                owner_id: owner_id.to_string(),
                content: content.to_string(),
                visibility,
                forked_from_id: None,
            })?;
            queries::insert_audit(conn, AuditAction::DocumentCreated, owner_id, None, Some(&doc.id), None)?;
            Ok::<_, DocumentError>(doc)
        })?;

        info!(document_id = %doc.id, owner_id, "document created");
        Ok(doc)
    }

    /// Fetch a document the caller may see.
    pub fn get(&self, id: &str, user_id: &str) -> Result<Document, DocumentError> {
        let conn = self.db.conn();
        let doc = conn
            .get_document(id)?
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        if !conn.can_view(user_id, &doc)? {
            warn!(document_id = id, user_id, "document read denied");
            return Err(DocumentError::Forbidden {
                id: id.to_string(),
                user_id: user_id.to_string(),
                action: "view",
            });
        }
        Ok(doc)
    }

    /// Replace a document's content. Requires owner or editor.
    pub fn update_content(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Document, DocumentError> {
        let doc = self.db.transaction(|conn| {
            let doc = conn
                .get_document(id)?
                .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
            if !conn.is_editor(user_id, &doc)? {
                return Err(DocumentError::Forbidden {
                    id: id.to_string(),
                    user_id: user_id.to_string(),
                    action: "edit",
                });
            }
            conn.set_content(id, content, None)?;
            queries::insert_audit(conn, AuditAction::DocumentUpdated, user_id, None, Some(id), None)?;
            conn.get_document(id)?
                .ok_or_else(|| DocumentError::NotFound(id.to_string()))
        })?;

        info!(document_id = id, user_id, version = doc.version, "document content updated");
        Ok(doc)
    }

    /// Grant `collaborator_id` access to a document. Owner only.
    pub fn add_collaborator(
        &self,
        id: &str,
        owner_id: &str,
        collaborator_id: &str,
        access: Access,
    ) -> Result<Vec<Collaborator>, DocumentError> {
        if collaborator_id.trim().is_empty() {
            return Err(DocumentError::Validation("userId must not be empty".into()));
        }

        let collaborators = self.db.transaction(|conn| {
            let doc = conn
                .get_document(id)?
                .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
            if !conn.is_owner(owner_id, &doc) {
                return Err(DocumentError::Forbidden {
                    id: id.to_string(),
                    user_id: owner_id.to_string(),
                    action: "share",
                });
            }
            queries::upsert_collaborator(conn, id, collaborator_id, access)?;
            queries::insert_audit(
                conn,
                AuditAction::CollaboratorAdded,
                owner_id,
                None,
                Some(id),
                Some(&format!("{collaborator_id}:{access}")),
            )?;
            Ok(queries::list_collaborators(conn, id)?)
        })?;

        info!(document_id = id, collaborator_id, access = %access, "collaborator added");
        Ok(collaborators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DocumentService {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        DocumentService::new(db)
    }

    #[test]
    fn test_create_and_get() {
        let svc = service();
        let doc = svc.create("alice", "  Todo ", "milk", Visibility::Private).unwrap();
        assert_eq!(doc.title, "Todo");
        assert_eq!(svc.get(&doc.id, "alice").unwrap().content, "milk");
        assert!(matches!(
            svc.get(&doc.id, "bob"),
            Err(DocumentError::Forbidden { .. })
        ));
        assert!(matches!(svc.get("nope", "alice"), Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_create_rejects_blank_title() {
        let svc = service();
        assert!(matches!(
            svc.create("alice", "   ", "", Visibility::Public),
            Err(DocumentError::Validation(_))
        ));
    }

    #[test]
    fn test_update_requires_editor() {
        let svc = service();
        let doc = svc.create("alice", "Todo", "milk", Visibility::Public).unwrap();

        assert!(matches!(
            svc.update_content(&doc.id, "bob", "eggs"),
            Err(DocumentError::Forbidden { .. })
        ));

        svc.add_collaborator(&doc.id, "alice", "bob", Access::Edit).unwrap();
        let updated = svc.update_content(&doc.id, "bob", "eggs").unwrap();
        assert_eq!(updated.content, "eggs");
        assert_eq!(updated.version, doc.version + 1);
    }

    #[test]
    fn test_only_owner_can_share() {
        let svc = service();
        let doc = svc.create("alice", "Todo", "", Visibility::Public).unwrap();
        assert!(matches!(
            svc.add_collaborator(&doc.id, "bob", "carol", Access::View),
            Err(DocumentError::Forbidden { .. })
        ));
        let collaborators = svc.add_collaborator(&doc.id, "alice", "carol", Access::View).unwrap();
        assert_eq!(collaborators[0].user_id, "carol");
        assert_eq!(collaborators[0].access, Access::View);
    }
}
