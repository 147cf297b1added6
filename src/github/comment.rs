use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::{info, warn};

use super::client::GitHubApi;
use crate::event::{Event, EventKind};
use crate::outcome::Outcome;

/// Reaction contents accepted by the reactions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reaction {
    PlusOne,
    MinusOne,
    Laugh,
    Confused,
    Heart,
    Hooray,
    Rocket,
    #[default]
    Eyes,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::PlusOne => "+1",
            Reaction::MinusOne => "-1",
            Reaction::Laugh => "laugh",
            Reaction::Confused => "confused",
            Reaction::Heart => "heart",
            Reaction::Hooray => "hooray",
            Reaction::Rocket => "rocket",
            Reaction::Eyes => "eyes",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reaction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "+1" => Ok(Reaction::PlusOne),
            "-1" => Ok(Reaction::MinusOne),
            "laugh" => Ok(Reaction::Laugh),
            "confused" => Ok(Reaction::Confused),
            "heart" => Ok(Reaction::Heart),
            "hooray" => Ok(Reaction::Hooray),
            "rocket" => Ok(Reaction::Rocket),
            "eyes" => Ok(Reaction::Eyes),
            other => Err(anyhow!("Unknown reaction: {}", other)),
        }
    }
}

/// Post `body` as an issue/PR comment.
///
/// A blank body or missing target is a no-op. API failures are returned as
/// errors: a review that cannot be delivered failed.
pub async fn post_comment(
    api: &dyn GitHubApi,
    repo: &str,
    target: Option<u64>,
    body: &str,
) -> Result<Outcome> {
    if body.trim().is_empty() {
        info!("Comment body is empty, nothing to post");
        return Ok(Outcome::skipped("empty comment body"));
    }
    let Some(number) = target else {
        info!("No target issue or pull request, nothing to post");
        return Ok(Outcome::skipped("no comment target"));
    };

    let endpoint = format!("repos/{}/issues/{}/comments", repo, number);
    api.post(&endpoint, &json!({ "body": body })).await?;
    info!(issue = number, bytes = body.len(), "Posted comment");
    Ok(Outcome::Done(()))
}

/// Endpoint the reaction for `event` goes to.
///
/// Reviews cannot carry reactions, so they fall back to the pull request.
pub fn reaction_endpoint(repo: &str, event: &Event) -> String {
    match (event.kind, event.comment_id) {
        (EventKind::IssueComment, Some(id)) => {
            format!("repos/{}/issues/comments/{}/reactions", repo, id)
        }
        (EventKind::ReviewComment, Some(id)) => {
            format!("repos/{}/pulls/comments/{}/reactions", repo, id)
        }
        _ => format!("repos/{}/issues/{}/reactions", repo, event.target_number),
    }
}

/// Best-effort status reaction. Never fails the run.
pub async fn react(
    api: &dyn GitHubApi,
    repo: &str,
    event: &Event,
    reaction: Option<Reaction>,
) -> Outcome {
    let reaction = reaction.unwrap_or_default();
    let endpoint = reaction_endpoint(repo, event);

    match api
        .post(&endpoint, &json!({ "content": reaction.as_str() }))
        .await
    {
        Ok(_) => {
            info!(%reaction, issue = event.target_number, "Added reaction");
            Outcome::Done(())
        }
        Err(e) => {
            warn!(%reaction, error = %format!("{e:#}"), "Failed to add reaction");
            Outcome::failed(format!("{e:#}"))
        }
    }
}
