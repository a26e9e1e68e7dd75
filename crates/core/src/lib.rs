//! notemerge core library.
//!
//! This crate provides the building blocks of the fork / pull request
//! service: a pure three-way merge engine, the fork manager, the pull request
//! lifecycle and conflict resolution workflow, configuration, and SQLite
//! persistence.

pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod fork;
pub mod merge;
pub mod models;
pub mod pull_request;
pub mod store;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use documents::DocumentService;
pub use fork::ForkManager;
pub use merge::Merger;
pub use pull_request::PullRequestService;
