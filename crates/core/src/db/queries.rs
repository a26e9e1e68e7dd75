//! Typed query helpers for every table in the notemerge database.
//!
//! The free functions take a `&Connection` so they compose inside
//! [`Database::transaction`]. Read-only conveniences used by the web and CLI
//! layers are also exposed as methods on [`Database`].

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::errors::DatabaseError;
use crate::merge::ConflictHunk;
use crate::models::{
    Access, AuditAction, Collaborator, Document, Fork, NewDocument, PrStatus, PullRequest,
    SourceSnapshot, TargetSnapshot, Visibility,
};

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row from the `audit_log` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub actor_id: String,
    pub pull_request_id: Option<String>,
    pub document_id: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// documents
// ---------------------------------------------------------------------------

const DOCUMENT_COLUMNS: &str =
    "id, title, owner_id, content, visibility, forked_from_id, version, created_at, updated_at";

/// Insert a new document at version 1.
pub fn insert_document(conn: &Connection, new: &NewDocument) -> Result<Document, DatabaseError> {
    let now = Utc::now();
    let doc = Document {
        id: Uuid::new_v4().to_string(),
        title: new.title.clone(),
        owner_id: new.owner_id.clone(),
        content: new.content.clone(),
        visibility: new.visibility,
        forked_from_id: new.forked_from_id.clone(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO documents (id, title, owner_id, content, visibility, forked_from_id,
            version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            doc.id,
            doc.title,
            doc.owner_id,
            doc.content,
            doc.visibility.as_str(),
            doc.forked_from_id,
            doc.version,
            doc.created_at.to_rfc3339(),
            doc.updated_at.to_rfc3339(),
        ],
    )?;
    debug!(document_id = %doc.id, owner_id = %doc.owner_id, "inserted document");
    Ok(doc)
}

pub fn get_document(conn: &Connection, id: &str) -> Result<Option<Document>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
    let doc = conn
        .query_row(&sql, params![id], document_from_row)
        .optional()?;
    Ok(doc)
}

/// Replace a document's content and bump its version.
///
/// With `expected_version` the write only happens if the stored version still
/// matches. Returns `false` when no row was updated.
pub fn update_document_content(
    conn: &Connection,
    id: &str,
    content: &str,
    expected_version: Option<i64>,
) -> Result<bool, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = match expected_version {
        Some(version) => conn.execute(
            "UPDATE documents SET content = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![content, now, id, version],
        )?,
        None => conn.execute(
            "UPDATE documents SET content = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3",
            params![content, now, id],
        )?,
    };
    debug!(document_id = id, expected_version, changed, "updated document content");
    Ok(changed == 1)
}

/// Insert or update a collaborator grant.
pub fn upsert_collaborator(
    conn: &Connection,
    document_id: &str,
    user_id: &str,
    access: Access,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO document_collaborators (document_id, user_id, access) VALUES (?1, ?2, ?3)
         ON CONFLICT (document_id, user_id) DO UPDATE SET access = excluded.access",
        params![document_id, user_id, access.as_str()],
    )?;
    debug!(document_id, user_id, access = %access, "upserted collaborator");
    Ok(())
}

pub fn get_collaborator_access(
    conn: &Connection,
    document_id: &str,
    user_id: &str,
) -> Result<Option<Access>, DatabaseError> {
    let access = conn
        .query_row(
            "SELECT access FROM document_collaborators WHERE document_id = ?1 AND user_id = ?2",
            params![document_id, user_id],
            |row| {
                let raw: String = row.get(0)?;
                parse_enum(0, &raw, "access", Access::parse)
            },
        )
        .optional()?;
    Ok(access)
}

pub fn list_collaborators(
    conn: &Connection,
    document_id: &str,
) -> Result<Vec<Collaborator>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT document_id, user_id, access FROM document_collaborators
         WHERE document_id = ?1 ORDER BY user_id",
    )?;
    let rows = stmt
        .query_map(params![document_id], |row| {
            let raw: String = row.get(2)?;
            Ok(Collaborator {
                document_id: row.get(0)?,
                user_id: row.get(1)?,
                access: parse_enum(2, &raw, "access", Access::parse)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// forks
// ---------------------------------------------------------------------------

pub fn insert_fork(conn: &Connection, fork: &Fork) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO forks (id, original_document_id, fork_document_id, forked_by_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            fork.id,
            fork.original_document_id,
            fork.fork_document_id,
            fork.forked_by_id,
            fork.created_at.to_rfc3339(),
        ],
    )?;
    debug!(fork_id = %fork.id, original = %fork.original_document_id, "inserted fork");
    Ok(())
}

/// Forks taken from `original_document_id`, oldest first.
pub fn list_forks_of(
    conn: &Connection,
    original_document_id: &str,
) -> Result<Vec<Fork>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, original_document_id, fork_document_id, forked_by_id, created_at
         FROM forks WHERE original_document_id = ?1 ORDER BY created_at, rowid",
    )?;
    let forks = stmt
        .query_map(params![original_document_id], |row| {
            let created_at: String = row.get(4)?;
            Ok(Fork {
                id: row.get(0)?,
                original_document_id: row.get(1)?,
                fork_document_id: row.get(2)?,
                forked_by_id: row.get(3)?,
                created_at: parse_timestamp(4, &created_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(forks)
}

// ---------------------------------------------------------------------------
// pull_requests
// ---------------------------------------------------------------------------

const PULL_REQUEST_COLUMNS: &str = "id, title, description, author_id, source_document_id,
    source_content, target_document_id, base_content, status, merge_conflicts, version,
    created_at, merged_at, closed_at";

pub fn insert_pull_request(conn: &Connection, pr: &PullRequest) -> Result<(), DatabaseError> {
    let conflicts = pr
        .merge_conflicts
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO pull_requests (id, title, description, author_id, source_document_id,
            source_content, target_document_id, base_content, status, merge_conflicts, version,
            created_at, merged_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            pr.id,
            pr.title,
            pr.description,
            pr.author_id,
            pr.source.document_id,
            pr.source.content,
            pr.target.document_id,
            pr.target.base_content,
            pr.status.as_str(),
            conflicts,
            pr.version,
            pr.created_at.to_rfc3339(),
            pr.merged_at.map(|t| t.to_rfc3339()),
            pr.closed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    debug!(pr_id = %pr.id, target = %pr.target.document_id, "inserted pull request");
    Ok(())
}

pub fn get_pull_request(conn: &Connection, id: &str) -> Result<Option<PullRequest>, DatabaseError> {
    let sql = format!("SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests WHERE id = ?1");
    let pr = conn
        .query_row(&sql, params![id], pull_request_from_row)
        .optional()?;
    Ok(pr)
}

/// Pull requests, newest first, optionally filtered by status.
pub fn list_pull_requests(
    conn: &Connection,
    status: Option<PrStatus>,
    limit: u32,
) -> Result<Vec<PullRequest>, DatabaseError> {
    let prs = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests WHERE status = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status.as_str(), limit], pull_request_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], pull_request_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(prs)
}

/// Open pull requests whose target document is owned by `owner_id`, newest
/// first.
pub fn list_open_for_owner(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<PullRequest>, DatabaseError> {
    let columns = PULL_REQUEST_COLUMNS
        .split(',')
        .map(|c| format!("pr.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM pull_requests pr
         JOIN documents d ON d.id = pr.target_document_id
         WHERE pr.status = 'open' AND d.owner_id = ?1
         ORDER BY pr.created_at DESC, pr.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let prs = stmt
        .query_map(params![owner_id], pull_request_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(prs)
}

/// Overwrite the stored conflicts of an open pull request.
///
/// Guarded by `status = 'open'` and the version read by the caller. Returns
/// `false` when the guard did not match.
pub fn record_merge_conflicts(
    conn: &Connection,
    id: &str,
    conflicts: &[ConflictHunk],
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    let json = serde_json::to_string(conflicts)?;
    let changed = conn.execute(
        "UPDATE pull_requests SET merge_conflicts = ?1, version = version + 1
         WHERE id = ?2 AND status = 'open' AND version = ?3",
        params![json, id, expected_version],
    )?;
    debug!(pr_id = id, hunks = conflicts.len(), changed, "recorded merge conflicts");
    Ok(changed == 1)
}

/// Transition an open pull request to `merged` and clear its conflicts.
pub fn mark_merged(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    merged_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE pull_requests
         SET status = 'merged', merged_at = ?1, merge_conflicts = NULL, version = version + 1
         WHERE id = ?2 AND status = 'open' AND version = ?3",
        params![merged_at.to_rfc3339(), id, expected_version],
    )?;
    debug!(pr_id = id, changed, "marked pull request merged");
    Ok(changed == 1)
}

/// Transition an open pull request to `closed`.
pub fn mark_closed(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    closed_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE pull_requests SET status = 'closed', closed_at = ?1, version = version + 1
         WHERE id = ?2 AND status = 'open' AND version = ?3",
        params![closed_at.to_rfc3339(), id, expected_version],
    )?;
    debug!(pr_id = id, changed, "marked pull request closed");
    Ok(changed == 1)
}

pub fn count_pull_requests_by_status(
    conn: &Connection,
    status: PrStatus,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM pull_requests WHERE status = ?1",
        params![status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// audit_log
// ---------------------------------------------------------------------------

/// Insert an audit-log entry.
pub fn insert_audit(
    conn: &Connection,
    action: AuditAction,
    actor_id: &str,
    pull_request_id: Option<&str>,
    document_id: Option<&str>,
    details: Option<&str>,
) -> Result<i64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO audit_log (action, actor_id, pull_request_id, document_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![action.as_str(), actor_id, pull_request_id, document_id, details, now],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, action = %action, actor_id, "inserted audit_log entry");
    Ok(id)
}

/// Most recent audit-log entries, newest first.
pub fn list_audit_log(conn: &Connection, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, action, actor_id, pull_request_id, document_id, details, created_at
         FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit], audit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Audit entries for one pull request, oldest first.
pub fn list_audit_for_pull_request(
    conn: &Connection,
    pull_request_id: &str,
) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, action, actor_id, pull_request_id, document_id, details, created_at
         FROM audit_log WHERE pull_request_id = ?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![pull_request_id], audit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Database conveniences
// ---------------------------------------------------------------------------

impl Database {
    pub fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        get_document(&self.conn(), id)
    }

    pub fn get_pull_request(&self, id: &str) -> Result<Option<PullRequest>, DatabaseError> {
        get_pull_request(&self.conn(), id)
    }

    pub fn list_pull_requests(
        &self,
        status: Option<PrStatus>,
        limit: u32,
    ) -> Result<Vec<PullRequest>, DatabaseError> {
        list_pull_requests(&self.conn(), status, limit)
    }

    pub fn list_forks_of(&self, original_document_id: &str) -> Result<Vec<Fork>, DatabaseError> {
        list_forks_of(&self.conn(), original_document_id)
    }

    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        list_audit_log(&self.conn(), limit)
    }

    pub fn list_audit_for_pull_request(
        &self,
        pull_request_id: &str,
    ) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        list_audit_for_pull_request(&self.conn(), pull_request_id)
    }

    pub fn count_pull_requests_by_status(&self, status: PrStatus) -> Result<i64, DatabaseError> {
        count_pull_requests_by_status(&self.conn(), status)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let visibility: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        owner_id: row.get(2)?,
        content: row.get(3)?,
        visibility: parse_enum(4, &visibility, "visibility", Visibility::parse)?,
        forked_from_id: row.get(5)?,
        version: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
    })
}

fn pull_request_from_row(row: &Row<'_>) -> rusqlite::Result<PullRequest> {
    let status: String = row.get(8)?;
    let conflicts: Option<String> = row.get(9)?;
    let created_at: String = row.get(11)?;
    let merged_at: Option<String> = row.get(12)?;
    let closed_at: Option<String> = row.get(13)?;

    let merge_conflicts = conflicts
        .map(|json| {
            serde_json::from_str::<Vec<ConflictHunk>>(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(PullRequest {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        author_id: row.get(3)?,
        source: SourceSnapshot {
            document_id: row.get(4)?,
            content: row.get(5)?,
        },
        target: TargetSnapshot {
            document_id: row.get(6)?,
            base_content: row.get(7)?,
        },
        status: parse_enum(8, &status, "status", PrStatus::parse)?,
        merge_conflicts,
        version: row.get(10)?,
        created_at: parse_timestamp(11, &created_at)?,
        merged_at: merged_at.map(|s| parse_timestamp(12, &s)).transpose()?,
        closed_at: closed_at.map(|s| parse_timestamp(13, &s)).transpose()?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        actor_id: row.get(2)?,
        pull_request_id: row.get(3)?,
        document_id: row.get(4)?,
        details: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_enum<T>(
    idx: usize,
    raw: &str,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(DatabaseError::Corrupt {
                column: column.into(),
                value: raw.into(),
            }),
        )
    })
}
