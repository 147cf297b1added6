use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::client::GitHubApi;
use crate::event::Event;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Unchanged,
    #[serde(other)]
    Changed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Changed => "changed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileChange {
    #[serde(rename = "filename")]
    pub path: String,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Absent for binary files and very large diffs.
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }

    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
    commit: RawCommitDetail,
}

#[derive(Debug, Deserialize)]
struct RawCommitDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: User,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestMeta {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub is_pull_request: bool,
}

/// Snapshot of a PR (or issue) the prompt is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestContext {
    pub repo: String,
    pub pr: Option<PullRequestMeta>,
    pub files: Vec<FileChange>,
    pub commits: Vec<CommitSummary>,
}

impl PullRequestContext {
    pub fn empty(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            pr: None,
            files: Vec::new(),
            commits: Vec::new(),
        }
    }

    /// Plain issues carry everything needed in the event itself.
    pub fn from_issue(repo: &str, event: &Event) -> Self {
        Self {
            repo: repo.to_string(),
            pr: Some(PullRequestMeta {
                number: event.target_number,
                title: event.title.clone(),
                author: String::new(),
                url: None,
                description: Some(event.body.clone()).filter(|b| !b.trim().is_empty()),
                is_pull_request: false,
            }),
            files: Vec::new(),
            commits: Vec::new(),
        }
    }
}

/// Fetch PR metadata, files and commits.
///
/// Never fails: any error is logged and an empty context comes back so the
/// review can still run on whatever the prompt has.
pub async fn load_pull_request_context(
    api: &dyn GitHubApi,
    repo: &str,
    number: u64,
) -> PullRequestContext {
    match fetch_pull_request_context(api, repo, number).await {
        Ok(context) => {
            info!(
                pr = number,
                files = context.files.len(),
                commits = context.commits.len(),
                "Loaded pull request context"
            );
            context
        }
        Err(e) => {
            warn!(pr = number, error = %format!("{e:#}"), "Failed to load pull request context, continuing without it");
            PullRequestContext::empty(repo)
        }
    }
}

async fn fetch_pull_request_context(
    api: &dyn GitHubApi,
    repo: &str,
    number: u64,
) -> Result<PullRequestContext> {
    let endpoint = format!("repos/{}/pulls/{}", repo, number);
    let raw: RawPullRequest = serde_json::from_value(api.get(&endpoint).await?)
        .context("Failed to parse pull request response")?;

    let endpoint = format!("repos/{}/pulls/{}/files?per_page=100", repo, number);
    let files = api
        .get_paginated(&endpoint)
        .await?
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<FileChange>, _>>()
        .context("Failed to parse pull request files response")?;

    let endpoint = format!("repos/{}/pulls/{}/commits?per_page=100", repo, number);
    let commits = api
        .get_paginated(&endpoint)
        .await?
        .into_iter()
        .map(serde_json::from_value::<RawCommit>)
        .map(|raw| {
            raw.map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse pull request commits response")?;

    Ok(PullRequestContext {
        repo: repo.to_string(),
        pr: Some(PullRequestMeta {
            number: raw.number,
            title: raw.title,
            author: raw.user.login,
            url: raw.html_url,
            description: raw.body.filter(|b| !b.trim().is_empty()),
            is_pull_request: true,
        }),
        files,
        commits,
    })
}
