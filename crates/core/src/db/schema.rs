//! Database schema definitions and migration runner.
//!
//! Migrations are plain SQL strings applied in order. The SQLite
//! `user_version` pragma records which ones have already run.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "documents, forks and pull requests",
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            owner_id        TEXT NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            visibility      TEXT NOT NULL DEFAULT 'private'
                                CHECK (visibility IN ('private', 'public')),
            forked_from_id  TEXT,
            version         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents (owner_id);
        CREATE INDEX IF NOT EXISTS idx_documents_forked_from ON documents (forked_from_id);

        CREATE TABLE IF NOT EXISTS document_collaborators (
            document_id     TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            access          TEXT NOT NULL CHECK (access IN ('view', 'edit')),
            PRIMARY KEY (document_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS forks (
            id                      TEXT PRIMARY KEY,
            original_document_id    TEXT NOT NULL,
            fork_document_id        TEXT NOT NULL,
            forked_by_id            TEXT NOT NULL,
            created_at              TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_forks_original ON forks (original_document_id);

        CREATE TABLE IF NOT EXISTS pull_requests (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            author_id           TEXT NOT NULL,
            source_document_id  TEXT NOT NULL,
            source_content      TEXT NOT NULL,
            target_document_id  TEXT NOT NULL,
            base_content        TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'open'
                                    CHECK (status IN ('open', 'merged', 'closed')),
            merge_conflicts     TEXT,
            version             INTEGER NOT NULL DEFAULT 1,
            created_at          TEXT NOT NULL,
            merged_at           TEXT,
            closed_at           TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_pull_requests_status ON pull_requests (status);
        CREATE INDEX IF NOT EXISTS idx_pull_requests_target ON pull_requests (target_document_id);
        "#,
    ),
    (
        2,
        "audit log",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            action              TEXT NOT NULL,
            actor_id            TEXT NOT NULL,
            pull_request_id     TEXT,
            document_id         TEXT,
            details             TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_pull_request ON audit_log (pull_request_id);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = latest_version(),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// The schema version the binary expects.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.0).unwrap_or(0)
}

/// Read the current schema version from the SQLite `user_version` pragma.
pub fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
