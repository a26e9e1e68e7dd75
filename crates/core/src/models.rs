//! Domain model types used throughout notemerge.
//!
//! These types bridge the services, the database layer, and the web API.
//! Everything serializes in camelCase because the JSON API is the main
//! consumer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::merge::ConflictHunk;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Who can see a document besides its owner and collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborator access level on a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    View,
    Edit,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Self::View),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note. `content` is the single current truth for the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    pub content: String,
    pub visibility: Visibility,
    /// Back-reference to the document this one was forked from.
    pub forked_from_id: Option<String>,
    /// Incremented on every content write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub owner_id: String,
    pub content: String,
    pub visibility: Visibility,
    pub forked_from_id: Option<String>,
}

/// A row from the collaborator table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub document_id: String,
    pub user_id: String,
    pub access: Access,
}

// ---------------------------------------------------------------------------
// Forks
// ---------------------------------------------------------------------------

/// Historical record that `fork_document_id` was copied from
/// `original_document_id`. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Fork {
    pub id: String,
    pub original_document_id: String,
    pub fork_document_id: String,
    pub forked_by_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Pull request status. `Merged` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source side of a pull request, frozen at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    pub document_id: String,
    pub content: String,
}

/// Target side of a pull request. `base_content` is the three-way base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetSnapshot {
    pub document_id: String,
    pub base_content: String,
}

/// A proposed merge of a fork back into its target document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author_id: String,
    pub source: SourceSnapshot,
    pub target: TargetSnapshot,
    pub status: PrStatus,
    /// Conflicts from the latest failed merge attempt, while still open.
    pub merge_conflicts: Option<Vec<ConflictHunk>>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Bumped on every write to the pull request row.
    pub version: i64,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.status == PrStatus::Open
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    DocumentCreated,
    DocumentUpdated,
    CollaboratorAdded,
    Fork,
    PrCreated,
    MergeConflict,
    Merged,
    Resolved,
    Closed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "document_created",
            Self::DocumentUpdated => "document_updated",
            Self::CollaboratorAdded => "collaborator_added",
            Self::Fork => "fork",
            Self::PrCreated => "pr_created",
            Self::MergeConflict => "merge_conflict",
            Self::Merged => "merged",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
