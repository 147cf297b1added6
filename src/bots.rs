use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::event::Event;

/// Bots that run when `ACTIVE_BOTS` is unset or blank.
pub const DEFAULT_ACTIVE_BOTS: &[&str] = &["claude", "codex", "gemini"];

/// One reviewer bot: its triggers, credential provider and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: String,
    #[serde(default)]
    pub trigger_prefixes: Vec<String>,
    /// Provider whose `<PROVIDER>_API_KEY` slots the bot draws from.
    #[serde(default)]
    pub key_provider: Option<String>,
    /// Program and arguments; `{model}` is substituted at run time.
    #[serde(default)]
    pub command: Vec<String>,
}

impl BotConfig {
    fn builtin(id: &str, provider: &str, command: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            trigger_prefixes: vec![format!("@{id}"), format!("/{id}")],
            key_provider: Some(provider.to_string()),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// True if `text` opens with one of this bot's trigger prefixes.
    pub fn is_triggered_by(&self, text: &str) -> bool {
        let text = text.trim_start();
        self.trigger_prefixes
            .iter()
            .any(|prefix| prefix_matches(text, prefix))
    }
}

pub fn default_bots() -> Vec<BotConfig> {
    vec![
        BotConfig::builtin("claude", "ANTHROPIC", &["claude", "-p", "--model", "{model}"]),
        BotConfig::builtin(
            "codex",
            "OPENAI",
            &["codex", "exec", "--model", "{model}", "-"],
        ),
        BotConfig::builtin("gemini", "GEMINI", &["gemini", "--model", "{model}"]),
    ]
}

/// Prefix match: symbol-led prefixes (`@bot`, `/bot`) are case-sensitive,
/// bare words (`BOT`) are not.
pub fn prefix_matches(text: &str, prefix: &str) -> bool {
    let Some(first) = prefix.chars().next() else {
        return false;
    };

    if first.is_alphanumeric() {
        text.to_lowercase().starts_with(&prefix.to_lowercase())
    } else {
        text.starts_with(prefix)
    }
}

/// Resolve the active-bots allow-list from its raw JSON value.
///
/// Unset or blank falls back to [`DEFAULT_ACTIVE_BOTS`]; `[]` is an explicit
/// empty list; anything that is not a JSON array of strings is an error.
pub fn parse_active_bots(raw: Option<&str>) -> Result<BTreeSet<String>, ConfigError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => {
            return Ok(DEFAULT_ACTIVE_BOTS.iter().map(|s| s.to_string()).collect());
        }
        Some(raw) => raw,
    };

    let ids: Vec<String> =
        serde_json::from_str(raw).map_err(|source| ConfigError::MalformedActiveBots {
            value: raw.to_string(),
            source,
        })?;

    Ok(ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// Pick the bots that should run for `event`.
///
/// The result is always a subset of `active`.
pub fn select_bots(
    event: &Event,
    active: &BTreeSet<String>,
    configs: &[BotConfig],
) -> BTreeSet<String> {
    let candidates = configs.iter().filter(|bot| active.contains(&bot.id));

    if !event.kind.is_interactive() {
        return candidates.map(|bot| bot.id.clone()).collect();
    }

    let text = event.trigger_text();
    candidates
        .filter(|bot| bot.is_triggered_by(&text))
        .map(|bot| bot.id.clone())
        .collect()
}
