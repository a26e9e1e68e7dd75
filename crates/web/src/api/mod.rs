//! REST API endpoint modules.

pub mod audit;
pub mod auth;
pub mod forks;
pub mod notes;
pub mod prs;
pub mod status;
