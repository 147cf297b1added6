use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ai::prompts::PromptLimits;
use crate::bots::{self, BotConfig};
use crate::keys;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ACTIVE_BOTS must be a JSON array of bot ids, got `{value}`: {source}")]
    MalformedActiveBots {
        value: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("{name} must be a positive integer, got `{value}`")]
    InvalidNumber { name: &'static str, value: String },
    #[error("GITHUB_REPOSITORY must look like owner/name, got `{0}`")]
    InvalidRepository(String),
    #[error("failed to read bot config {}: {source}", .path.display())]
    ReadBotsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid bot config {}: {source}", .path.display())]
    ParseBotsFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk bot table (`bots.toml`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    prompt: Option<PromptLimits>,
    bots: Vec<BotConfig>,
}

/// Everything the dispatcher reads from its environment, captured once.
#[derive(Clone)]
pub struct Config {
    env: HashMap<String, String>,
    pub repo: Option<String>,
    pub event_name: Option<String>,
    pub event_path: Option<PathBuf>,
    pub active_bots: BTreeSet<String>,
    pub bots: Vec<BotConfig>,
    pub prompt: PromptLimits,
    pub rotation_seed: String,
    pub export_name: Option<String>,
    pub token: Option<String>,
    pub output_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment, falling back to the XDG bot table.
    pub fn load() -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let xdg_bots = xdg::BaseDirectories::with_prefix("prbots")
            .ok()
            .and_then(|dirs| dirs.find_config_file("bots.toml"));
        Self::from_env(env, xdg_bots.as_deref())
    }

    /// Build a config from an env snapshot.
    ///
    /// `PRBOTS_CONFIG` wins over `fallback_bots_file`; with neither, the
    /// built-in bot table is used.
    pub fn from_env(
        env: HashMap<String, String>,
        fallback_bots_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let active_bots = bots::parse_active_bots(env.get("ACTIVE_BOTS").map(String::as_str))?;

        let bots_file = non_empty(&env, "PRBOTS_CONFIG")
            .map(PathBuf::from)
            .or_else(|| fallback_bots_file.map(Path::to_path_buf));
        let file = match bots_file {
            Some(path) => read_bots_file(&path)?,
            None => FileConfig::default(),
        };

        let mut prompt = file.prompt.unwrap_or_default();
        if let Some(budget) = parse_number(&env, "PROMPT_PATCH_BUDGET")? {
            prompt.patch_budget = budget;
        }
        if let Some(max) = parse_number(&env, "PROMPT_MAX_CHARS")? {
            prompt.max_chars = max;
        }

        check_positive("prompt.patch_budget", prompt.patch_budget)?;
        check_positive("prompt.max_chars", prompt.max_chars)?;

        let bots = if file.bots.is_empty() {
            bots::default_bots()
        } else {
            file.bots
        };

        let rotation_seed = non_empty(&env, "KEY_ROTATION_SEED")
            .map(str::to_string)
            .unwrap_or_else(|| {
                keys::default_seed(
                    non_empty(&env, "GITHUB_RUN_ID"),
                    non_empty(&env, "GITHUB_JOB"),
                )
            });

        Ok(Self {
            repo: non_empty(&env, "GITHUB_REPOSITORY").map(str::to_string),
            event_name: non_empty(&env, "GITHUB_EVENT_NAME").map(str::to_string),
            event_path: non_empty(&env, "GITHUB_EVENT_PATH").map(PathBuf::from),
            export_name: non_empty(&env, "KEY_EXPORT_NAME").map(str::to_string),
            token: non_empty(&env, "GH_TOKEN")
                .or_else(|| non_empty(&env, "GITHUB_TOKEN"))
                .map(str::to_string),
            output_path: non_empty(&env, "GITHUB_OUTPUT").map(PathBuf::from),
            env_path: non_empty(&env, "GITHUB_ENV").map(PathBuf::from),
            active_bots,
            bots,
            prompt,
            rotation_seed,
            env,
        })
    }

    /// Snapshot the key rotator draws credential slots from.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn bot(&self, id: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|bot| bot.id == id)
    }

    /// `owner/name`, required by anything that talks to the API.
    pub fn require_repo(&self) -> Result<&str, ConfigError> {
        let repo = self
            .repo
            .as_deref()
            .ok_or(ConfigError::MissingVar("GITHUB_REPOSITORY"))?;
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(repo),
            _ => Err(ConfigError::InvalidRepository(repo.to_string())),
        }
    }
}

// env holds API keys; never print it
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("repo", &self.repo)
            .field("event_name", &self.event_name)
            .field("event_path", &self.event_path)
            .field("active_bots", &self.active_bots)
            .field("bots", &self.bots)
            .field("prompt", &self.prompt)
            .field("rotation_seed", &self.rotation_seed)
            .field("export_name", &self.export_name)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("output_path", &self.output_path)
            .field("env_path", &self.env_path)
            .finish_non_exhaustive()
    }
}

fn non_empty<'a>(env: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    env.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_number(
    env: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = non_empty(env, name) else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: raw.to_string(),
        }),
    }
}

fn check_positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn read_bots_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadBotsFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::ParseBotsFile {
        path: path.to_path_buf(),
        source,
    })
}
