//! Pull requests: proposing that a fork's content be merged back into the
//! document it was forked from.

pub mod lifecycle;
pub mod resolution;

pub use lifecycle::{
    CreatePullRequest, MergeSuccess, PullRequestDetails, PullRequestDiff, PullRequestService,
};
pub use resolution::{compose, validate_resolved_content, HunkChoice};
