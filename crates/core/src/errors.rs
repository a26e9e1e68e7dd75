//! Error types for the notemerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::merge::ConflictHunk;
use crate::models::PrStatus;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    PullRequest(#[from] PullRequestError),

    #[error(transparent)]
    Fork(#[from] ForkError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Pull request errors
// ---------------------------------------------------------------------------

/// Errors from the pull request lifecycle.
#[derive(Debug, Error)]
pub enum PullRequestError {
    /// No pull request with this ID.
    #[error("pull request not found: {0}")]
    NotFound(String),

    /// A document referenced by the request (source or target) is missing.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The transition is not allowed from the current status.
    #[error("pull request {id} is {status}, expected open")]
    InvalidState { id: String, status: PrStatus },

    /// The caller lacks the required role on the target document.
    #[error("user '{user_id}' is not authorized to {action} pull request {id}")]
    Forbidden {
        id: String,
        user_id: String,
        action: &'static str,
    },

    /// The caller cannot read a document named in the request.
    #[error("user '{user_id}' may not read document {document_id}")]
    DocumentForbidden {
        document_id: String,
        user_id: String,
    },

    /// The request body failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The merge attempt found conflicts. The pull request stays open.
    #[error("merge conflicts detected ({} hunk(s))", .0.len())]
    ConflictDetected(Vec<ConflictHunk>),

    /// The target document changed while the merge was being computed.
    #[error("target document {document_id} changed during merge of pull request {id}; retry")]
    StaleTarget { id: String, document_id: String },

    /// Another attempt wrote the pull request first (for example by
    /// recording conflicts). The pull request is still open.
    #[error("pull request {id} changed concurrently; retry")]
    ConcurrentUpdate { id: String },

    #[error("pull request database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Fork errors
// ---------------------------------------------------------------------------

/// Errors from the fork manager.
#[derive(Debug, Error)]
pub enum ForkError {
    /// The document to fork does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The caller cannot read the document to fork.
    #[error("user '{user_id}' may not fork document {id}")]
    Forbidden { id: String, user_id: String },

    #[error("fork database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

/// Errors from direct document operations (create, edit, share).
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("user '{user_id}' is not authorized to {action} document {id}")]
    Forbidden {
        id: String,
        user_id: String,
        action: &'static str,
    },

    #[error("invalid document: {0}")]
    Validation(String),

    #[error("document database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A stored JSON column could not be encoded or decoded.
    #[error("database serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value does not match the expected format.
    #[error("corrupt {column} value: {value}")]
    Corrupt { column: String, value: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
