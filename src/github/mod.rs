pub mod client;
pub mod comment;
pub mod pr;

#[cfg(test)]
pub mod fake;

pub use client::{GhCli, GitHubApi};
pub use comment::{post_comment, react, Reaction};
pub use pr::{load_pull_request_context, CommitSummary, FileChange, FileStatus, PullRequestContext};
