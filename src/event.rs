use std::borrow::Cow;
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// PR actions that count as the trigger themselves.
const PR_LIFECYCLE_ACTIONS: &[&str] = &["opened", "synchronize", "reopened", "ready_for_review"];
const COMMENT_ACTIONS: &[&str] = &["created"];
const REVIEW_ACTIONS: &[&str] = &["submitted"];
const ISSUE_ACTIONS: &[&str] = &["opened", "reopened"];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("unsupported event `{0}`")]
    UnsupportedEvent(String),
    #[error("unsupported action `{action}` for `{event}` event")]
    UnsupportedAction { event: String, action: String },
    #[error("malformed `{event}` payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EventError {
    /// Unsupported events are skipped quietly; malformed payloads are fatal.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            EventError::UnsupportedEvent(_) | EventError::UnsupportedAction { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PullRequest,
    IssueComment,
    ReviewComment,
    Issue,
    Review,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::IssueComment => "issue_comment",
            EventKind::ReviewComment => "review_comment",
            EventKind::Issue => "issue",
            EventKind::Review => "review",
        }
    }

    /// Comments, reviews and issues need a trigger prefix; PR lifecycle events do not.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, EventKind::PullRequest)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Owner,
    Collaborator,
    Member,
    #[serde(alias = "FIRST_TIMER", alias = "FIRST_TIME_CONTRIBUTOR")]
    Contributor,
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub login: String,
    pub association: AuthorAssociation,
}

/// Canonical view of one inbound repository event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub action: String,
    pub actor: Actor,
    pub target_number: u64,
    /// Issue comments also arrive for pull requests.
    pub on_pull_request: bool,
    pub title: String,
    pub body: String,
    pub comment_body: Option<String>,
    pub comment_id: Option<u64>,
}

impl Event {
    pub fn association(&self) -> AuthorAssociation {
        self.actor.association
    }

    /// Text that trigger prefixes are matched against.
    pub fn trigger_text(&self) -> Cow<'_, str> {
        match self.kind {
            EventKind::PullRequest => Cow::Borrowed(""),
            EventKind::Issue => Cow::Owned(format!("{}\n{}", self.title, self.body)),
            EventKind::IssueComment | EventKind::ReviewComment | EventKind::Review => {
                Cow::Borrowed(self.comment_body.as_deref().unwrap_or(""))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
    author_association: AuthorAssociation,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
    author_association: AuthorAssociation,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
    author_association: AuthorAssociation,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    action: String,
    issue: RawIssue,
    comment: RawComment,
}

#[derive(Debug, Deserialize)]
struct ReviewCommentPayload {
    action: String,
    pull_request: RawPullRequest,
    comment: RawComment,
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    action: String,
    pull_request: RawPullRequest,
    review: RawComment,
}

#[derive(Debug, Deserialize)]
struct IssuesPayload {
    action: String,
    issue: RawIssue,
}

/// Parse a GitHub Actions event payload into an [`Event`].
pub fn parse_event(event_name: &str, payload: &str) -> Result<Event, EventError> {
    let malformed = |source| EventError::Malformed {
        event: event_name.to_string(),
        source,
    };

    let (event, allowed) = match event_name {
        "pull_request" | "pull_request_target" => {
            let raw: PullRequestPayload = serde_json::from_str(payload).map_err(malformed)?;
            let pr = raw.pull_request;
            let event = Event {
                kind: EventKind::PullRequest,
                action: raw.action,
                actor: actor(pr.user, pr.author_association),
                target_number: pr.number,
                on_pull_request: true,
                title: pr.title,
                body: pr.body.unwrap_or_default(),
                comment_body: None,
                comment_id: None,
            };
            (event, PR_LIFECYCLE_ACTIONS)
        }
        "issue_comment" => {
            let raw: IssueCommentPayload = serde_json::from_str(payload).map_err(malformed)?;
            let event = Event {
                kind: EventKind::IssueComment,
                action: raw.action,
                actor: actor(raw.comment.user, raw.comment.author_association),
                target_number: raw.issue.number,
                on_pull_request: raw.issue.pull_request.is_some(),
                title: raw.issue.title,
                body: raw.issue.body.unwrap_or_default(),
                comment_body: Some(raw.comment.body.unwrap_or_default()),
                comment_id: Some(raw.comment.id),
            };
            (event, COMMENT_ACTIONS)
        }
        "pull_request_review_comment" => {
            let raw: ReviewCommentPayload = serde_json::from_str(payload).map_err(malformed)?;
            let event = Event {
                kind: EventKind::ReviewComment,
                action: raw.action,
                actor: actor(raw.comment.user, raw.comment.author_association),
                target_number: raw.pull_request.number,
                on_pull_request: true,
                title: raw.pull_request.title,
                body: raw.pull_request.body.unwrap_or_default(),
                comment_body: Some(raw.comment.body.unwrap_or_default()),
                comment_id: Some(raw.comment.id),
            };
            (event, COMMENT_ACTIONS)
        }
        "pull_request_review" => {
            let raw: ReviewPayload = serde_json::from_str(payload).map_err(malformed)?;
            let event = Event {
                kind: EventKind::Review,
                action: raw.action,
                actor: actor(raw.review.user, raw.review.author_association),
                target_number: raw.pull_request.number,
                on_pull_request: true,
                title: raw.pull_request.title,
                body: raw.pull_request.body.unwrap_or_default(),
                comment_body: Some(raw.review.body.unwrap_or_default()),
                comment_id: Some(raw.review.id),
            };
            (event, REVIEW_ACTIONS)
        }
        "issues" => {
            let raw: IssuesPayload = serde_json::from_str(payload).map_err(malformed)?;
            let issue = raw.issue;
            let event = Event {
                kind: EventKind::Issue,
                action: raw.action,
                actor: actor(issue.user, issue.author_association),
                target_number: issue.number,
                on_pull_request: issue.pull_request.is_some(),
                title: issue.title,
                body: issue.body.unwrap_or_default(),
                comment_body: None,
                comment_id: None,
            };
            (event, ISSUE_ACTIONS)
        }
        other => return Err(EventError::UnsupportedEvent(other.to_string())),
    };

    if !allowed.contains(&event.action.as_str()) {
        return Err(EventError::UnsupportedAction {
            event: event_name.to_string(),
            action: event.action,
        });
    }

    Ok(event)
}

fn actor(user: RawUser, association: AuthorAssociation) -> Actor {
    Actor {
        login: user.login,
        association,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr_json(association: &str) -> serde_json::Value {
        json!({
            "number": 42,
            "title": "Add retry logic",
            "body": "Retries failed uploads",
            "user": { "login": "alice" },
            "author_association": association
        })
    }

    #[test]
    fn test_parse_pull_request_opened() {
        let payload = json!({ "action": "opened", "pull_request": pr_json("MEMBER") });
        let event = parse_event("pull_request", &payload.to_string()).unwrap();

        assert_eq!(event.kind, EventKind::PullRequest);
        assert_eq!(event.target_number, 42);
        assert_eq!(event.actor.login, "alice");
        assert_eq!(event.association(), AuthorAssociation::Member);
        assert_eq!(event.body, "Retries failed uploads");
        assert!(event.on_pull_request);
        assert_eq!(event.trigger_text(), "");

        let target = parse_event("pull_request_target", &payload.to_string()).unwrap();
        assert_eq!(target, event);
    }

    #[test]
    fn test_parse_pull_request_closed_is_unsupported() {
        let payload = json!({ "action": "closed", "pull_request": pr_json("OWNER") });
        let err = parse_event("pull_request", &payload.to_string()).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_parse_issue_comment_uses_commenter() {
        let payload = json!({
            "action": "created",
            "issue": {
                "number": 7,
                "title": "Crash on start",
                "body": null,
                "user": { "login": "reporter" },
                "author_association": "NONE",
                "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/7" }
            },
            "comment": {
                "id": 991,
                "body": "@claude please review",
                "user": { "login": "maintainer" },
                "author_association": "OWNER"
            }
        });
        let event = parse_event("issue_comment", &payload.to_string()).unwrap();

        assert_eq!(event.kind, EventKind::IssueComment);
        assert_eq!(event.actor.login, "maintainer");
        assert_eq!(event.association(), AuthorAssociation::Owner);
        assert_eq!(event.comment_id, Some(991));
        assert!(event.on_pull_request);
        assert_eq!(event.body, "");
        assert_eq!(event.trigger_text(), "@claude please review");
    }

    #[test]
    fn test_parse_review_comment_uses_commenter() {
        let payload = json!({
            "action": "created",
            "pull_request": pr_json("NONE"),
            "comment": {
                "id": 77,
                "body": "/claude check",
                "user": { "login": "maintainer" },
                "author_association": "MEMBER"
            }
        });
        let event = parse_event("pull_request_review_comment", &payload.to_string()).unwrap();

        assert_eq!(event.kind, EventKind::ReviewComment);
        assert_eq!(event.comment_id, Some(77));
        assert_eq!(event.actor.login, "maintainer");
        assert_eq!(event.association(), AuthorAssociation::Member);
        assert_eq!(event.target_number, 42);
        assert!(event.on_pull_request);
        assert_eq!(event.trigger_text(), "/claude check");

        let active = crate::bots::parse_active_bots(None).unwrap();
        let selected = crate::bots::select_bots(&event, &active, &crate::bots::default_bots());
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), ["claude"]);
    }

    #[test]
    fn test_parse_review_with_null_body() {
        let payload = json!({
            "action": "submitted",
            "pull_request": pr_json("CONTRIBUTOR"),
            "review": {
                "id": 5,
                "body": null,
                "user": { "login": "bob" },
                "author_association": "COLLABORATOR"
            }
        });
        let event = parse_event("pull_request_review", &payload.to_string()).unwrap();

        assert_eq!(event.kind, EventKind::Review);
        assert_eq!(event.association(), AuthorAssociation::Collaborator);
        assert_eq!(event.comment_body.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_issue_trigger_text_joins_title_and_body() {
        let payload = json!({
            "action": "opened",
            "issue": {
                "number": 3,
                "title": "@gemini triage this",
                "body": "Steps to reproduce",
                "user": { "login": "carol" },
                "author_association": "MEMBER"
            }
        });
        let event = parse_event("issues", &payload.to_string()).unwrap();

        assert_eq!(event.kind, EventKind::Issue);
        assert!(!event.on_pull_request);
        assert_eq!(event.trigger_text(), "@gemini triage this\nSteps to reproduce");
    }

    #[test]
    fn test_association_aliases() {
        let parse = |s: &str| serde_json::from_value::<AuthorAssociation>(json!(s)).unwrap();
        assert_eq!(parse("FIRST_TIMER"), AuthorAssociation::Contributor);
        assert_eq!(parse("FIRST_TIME_CONTRIBUTOR"), AuthorAssociation::Contributor);
        assert_eq!(parse("MANNEQUIN"), AuthorAssociation::None);
        assert_eq!(parse("NONE"), AuthorAssociation::None);
    }

    #[test]
    fn test_unknown_event_name() {
        let err = parse_event("push", "{}").unwrap_err();
        assert!(matches!(err, EventError::UnsupportedEvent(ref name) if name == "push"));
    }

    #[test]
    fn test_malformed_payload_is_not_unsupported() {
        let err = parse_event("issue_comment", r#"{"action": "created"}"#).unwrap_err();
        assert!(matches!(err, EventError::Malformed { .. }));
        assert!(!err.is_unsupported());
    }
}
