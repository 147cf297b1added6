//! The review pipeline: event -> trust -> bot selection -> key -> context ->
//! prompt -> reviewer -> comment.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::ai::{
    build_review_prompt, format_review_comment, run_reviewer, Prompt, ReviewerCommand,
    ReviewerRunner,
};
use crate::bots::select_bots;
use crate::config::{Config, ConfigError};
use crate::event::{parse_event, Event, EventKind};
use crate::github::{load_pull_request_context, post_comment, react, GitHubApi, PullRequestContext};
use crate::keys::{self, KeyPool, KeySlot};
use crate::outcome::Outcome;
use crate::trust::is_trusted;

/// A trusted event and the bots it should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub event: Event,
    pub bots: BTreeSet<String>,
}

/// Key chosen for one bot run.
#[derive(Debug, Clone)]
pub struct KeyChoice {
    pub pool: KeyPool,
    pub slot: KeySlot,
    /// Env var name the reviewer CLI reads the key from.
    pub export_name: String,
}

/// What happened to one bot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRun {
    pub outcome: Outcome,
    pub key_name: Option<String>,
    pub prompt_truncated: bool,
}

impl BotRun {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::skipped(reason),
            key_name: None,
            prompt_truncated: false,
        }
    }
}

/// Event name and raw payload, CLI overrides first.
pub fn read_event(
    config: &Config,
    name_override: Option<&str>,
    path_override: Option<&Path>,
) -> Result<(String, String)> {
    let name = name_override
        .or(config.event_name.as_deref())
        .ok_or(ConfigError::MissingVar("GITHUB_EVENT_NAME"))?;
    let path = path_override
        .or(config.event_path.as_deref())
        .ok_or(ConfigError::MissingVar("GITHUB_EVENT_PATH"))?;
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event payload {}", path.display()))?;
    Ok((name.to_string(), payload))
}

/// Normalize, trust-check and select bots.
///
/// Unsupported events and untrusted actors come back as `Skipped`; only a
/// malformed payload is an error.
pub fn plan(config: &Config, event_name: &str, payload: &str) -> Result<Outcome<DispatchPlan>> {
    let event = match parse_event(event_name, payload) {
        Ok(event) => event,
        Err(e) if e.is_unsupported() => {
            info!(event = event_name, reason = %e, "Ignoring event");
            return Ok(Outcome::skipped(e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if !is_trusted(&event) {
        info!(
            actor = %event.actor.login,
            association = ?event.association(),
            "Actor is not trusted, no bots dispatched"
        );
        return Ok(Outcome::skipped(format!(
            "@{} is not allowed to trigger review bots",
            event.actor.login
        )));
    }

    let bots = select_bots(&event, &config.active_bots, &config.bots);
    info!(
        kind = %event.kind,
        number = event.target_number,
        bots = ?bots,
        "Selected bots"
    );
    Ok(Outcome::Done(DispatchPlan { event, bots }))
}

/// Pick a key slot for `provider` from the config's env snapshot.
///
/// Export name precedence: `export_override`, then `KEY_EXPORT_NAME`, then
/// the provider's base key name.
pub fn choose_key(
    config: &Config,
    provider: &str,
    seed_override: Option<&str>,
    export_override: Option<&str>,
) -> Option<KeyChoice> {
    let seed = seed_override.unwrap_or(&config.rotation_seed);
    let slot = keys::select_key(config.env(), provider, seed)?;
    // the full pool gives the retry its alternate slot
    let pool = KeyPool::from_env(config.env(), provider);
    let export_name = export_override
        .or(config.export_name.as_deref())
        .unwrap_or(pool.base_name())
        .to_string();
    info!(provider, slot = %slot.name, slots = pool.len(), "Selected API key slot");
    Some(KeyChoice {
        pool,
        slot,
        export_name,
    })
}

/// PR context from the API, or issue context straight from the event.
pub async fn load_context(api: &dyn GitHubApi, repo: &str, event: &Event) -> PullRequestContext {
    if event.on_pull_request {
        load_pull_request_context(api, repo, event.target_number).await
    } else {
        PullRequestContext::from_issue(repo, event)
    }
}

/// The prompt for `event`; interactive events forward the comment as the
/// user's request.
pub async fn build_prompt(
    config: &Config,
    api: &dyn GitHubApi,
    repo: &str,
    event: &Event,
) -> Prompt {
    let context = load_context(api, repo, event).await;
    let request = match event.kind {
        EventKind::Issue | EventKind::PullRequest => None,
        _ => event.comment_body.as_deref(),
    };
    build_review_prompt(&context, request, &config.prompt)
}

/// Run one bot end to end and post its review.
///
/// Reviewer failures come back as `Outcome::Failed`. Failing to post a
/// produced review is an error.
pub async fn run_bot(
    config: &Config,
    api: &dyn GitHubApi,
    runner: &dyn ReviewerRunner,
    plan: &DispatchPlan,
    bot_id: &str,
    model: &str,
) -> Result<BotRun> {
    let repo = config.require_repo()?;
    if !plan.bots.contains(bot_id) {
        info!(bot = bot_id, "Bot not selected for this event");
        return Ok(BotRun::skipped(format!(
            "{} was not selected for this event",
            bot_id
        )));
    }
    let bot = config
        .bot(bot_id)
        .ok_or_else(|| anyhow!("Unknown bot: {}", bot_id))?;
    let command = ReviewerCommand::from_template(&bot.command, model)?;

    let key = match &bot.key_provider {
        Some(provider) => match choose_key(config, provider, None, None) {
            Some(key) => Some(key),
            None => {
                warn!(bot = bot_id, provider = %provider, "No API key configured");
                return Ok(BotRun::skipped(format!(
                    "no API key configured for {}",
                    provider
                )));
            }
        },
        None => None,
    };

    react(api, repo, &plan.event, None).await;

    let prompt = build_prompt(config, api, repo, &plan.event).await;
    info!(
        bot = bot_id,
        bytes = prompt.text.len(),
        truncated = prompt.truncated,
        "Built review prompt"
    );

    let export_name = key.as_ref().map(|k| k.export_name.as_str()).unwrap_or("");
    let review = run_reviewer(
        runner,
        &command,
        &prompt.text,
        key.as_ref().map(|k| (&k.pool, &k.slot)),
        export_name,
    )
    .await;

    let outcome = match review {
        Outcome::Done(output) => {
            let body = format_review_comment(bot_id, &output);
            post_comment(api, repo, Some(plan.event.target_number), &body).await?
        }
        Outcome::Skipped(reason) => Outcome::Skipped(reason),
        Outcome::Failed(error) => Outcome::Failed(error),
    };

    Ok(BotRun {
        outcome,
        key_name: key.map(|k| k.slot.name),
        prompt_truncated: prompt.truncated,
    })
}
