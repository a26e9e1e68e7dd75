//! Narrow collaborator interfaces consumed by the fork and pull request
//! services.
//!
//! Both traits are implemented for [`rusqlite::Connection`], so a service can
//! use them on a plain locked connection or on the connection handed to a
//! [`Database::transaction`](crate::db::Database::transaction) closure.

use rusqlite::Connection;

use crate::db::queries;
use crate::errors::DatabaseError;
use crate::models::{Access, Document, NewDocument, Visibility};

/// Reads and writes document content.
pub trait DocumentStore {
    fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError>;

    /// Write new content. With `expected_version`, only succeeds while the
    /// document is still at that version. Returns whether a write happened.
    fn set_content(
        &self,
        id: &str,
        content: &str,
        expected_version: Option<i64>,
    ) -> Result<bool, DatabaseError>;

    fn create_document(&self, new: &NewDocument) -> Result<Document, DatabaseError>;
}

/// Owner / editor / viewer checks over a document.
pub trait AccessPolicy {
    fn is_owner(&self, user_id: &str, document: &Document) -> bool {
        document.owner_id == user_id
    }

    /// Owner or collaborator with edit access.
    fn is_editor(&self, user_id: &str, document: &Document) -> Result<bool, DatabaseError>;

    /// Owner, any collaborator, or anyone for public documents.
    fn can_view(&self, user_id: &str, document: &Document) -> Result<bool, DatabaseError>;
}

impl DocumentStore for Connection {
    fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        queries::get_document(self, id)
    }

    fn set_content(
        &self,
        id: &str,
        content: &str,
        expected_version: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        queries::update_document_content(self, id, content, expected_version)
    }

    fn create_document(&self, new: &NewDocument) -> Result<Document, DatabaseError> {
        queries::insert_document(self, new)
    }
}

impl AccessPolicy for Connection {
    fn is_editor(&self, user_id: &str, document: &Document) -> Result<bool, DatabaseError> {
        if self.is_owner(user_id, document) {
            return Ok(true);
        }
        let access = queries::get_collaborator_access(self, &document.id, user_id)?;
        Ok(access == Some(Access::Edit))
    }

    fn can_view(&self, user_id: &str, document: &Document) -> Result<bool, DatabaseError> {
        if document.visibility == Visibility::Public || self.is_owner(user_id, document) {
            return Ok(true);
        }
        Ok(queries::get_collaborator_access(self, &document.id, user_id)?.is_some())
    }
}
