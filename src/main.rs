use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use prbots::config::{Config, ConfigError};
use prbots::dispatch::{self, DispatchPlan};
use prbots::github::{post_comment, react, GhCli, Reaction};
use prbots::keys::base_key_name;
use prbots::outcome::Outcome;
use prbots::output::{self, ActionOutputs};
use prbots::{ai, telemetry};

#[derive(Parser, Debug)]
#[command(name = "prbots")]
#[command(about = "Dispatch AI review bots for GitHub pull request and issue events")]
#[command(version)]
struct Args {
    /// Log format for stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
struct EventArgs {
    /// Event name (defaults to GITHUB_EVENT_NAME)
    #[arg(long)]
    event_name: Option<String>,

    /// Event payload file (defaults to GITHUB_EVENT_PATH)
    #[arg(long)]
    event: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide which bots run for the current event
    Dispatch {
        #[command(flatten)]
        event: EventArgs,
    },
    /// Pick one API key slot for a provider and export it
    SelectKey {
        /// Provider prefix, e.g. OPENAI or ANTHROPIC
        #[arg(long)]
        provider: String,

        /// Rotation seed (defaults to KEY_ROTATION_SEED, then run id and job)
        #[arg(long)]
        seed: Option<String>,

        /// Env var name to export the key under
        #[arg(long)]
        export_name: Option<String>,
    },
    /// Build the review prompt for the current event
    Prompt {
        #[command(flatten)]
        event: EventArgs,

        /// Write the prompt here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Post a file as a comment on an issue or pull request
    Post {
        /// Issue or pull request number
        #[arg(long)]
        target: Option<u64>,

        #[arg(long)]
        body_file: PathBuf,
    },
    /// React to the triggering comment or pull request
    React {
        #[command(flatten)]
        event: EventArgs,

        #[arg(long, default_value_t = Reaction::Eyes)]
        reaction: Reaction,
    },
    /// Run one bot end to end
    Run {
        #[arg(long)]
        bot: String,

        /// Model passed to the reviewer CLI
        #[arg(long, env = "MODEL")]
        model: Option<String>,

        #[command(flatten)]
        event: EventArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(args.log_format == LogFormat::Json, level);

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "prbots failed");
            output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::load()?;
    match command {
        Command::Dispatch { event } => run_dispatch(&config, &event),
        Command::SelectKey {
            provider,
            seed,
            export_name,
        } => run_select_key(&config, &provider, seed.as_deref(), export_name.as_deref()),
        Command::Prompt { event, out } => run_prompt(&config, &event, out.as_deref()).await,
        Command::Post { target, body_file } => run_post(&config, target, &body_file).await,
        Command::React { event, reaction } => run_react(&config, &event, reaction).await,
        Command::Run { bot, model, event } => {
            let model = model
                .filter(|m| !m.trim().is_empty())
                .ok_or(ConfigError::MissingVar("MODEL"))?;
            run_bot(&config, &event, &bot, &model).await
        }
    }
}

fn load_plan(config: &Config, args: &EventArgs) -> Result<Outcome<DispatchPlan>> {
    let (name, payload) =
        dispatch::read_event(config, args.event_name.as_deref(), args.event.as_deref())?;
    dispatch::plan(config, &name, &payload)
}

fn api(config: &Config) -> GhCli {
    GhCli::new(config.token.clone())
}

fn run_dispatch(config: &Config, args: &EventArgs) -> Result<()> {
    let mut outputs = ActionOutputs::new();
    match load_plan(config, args)? {
        Outcome::Done(plan) => {
            let bots: Vec<&String> = plan.bots.iter().collect();
            outputs
                .set("bots", serde_json::to_string(&bots)?)
                .set("count", bots.len())
                .set("target", plan.event.target_number)
                .set("kind", plan.event.kind)
                .set("skipped", bots.is_empty());
            if bots.is_empty() {
                output::notice("No review bots matched this event");
            }
        }
        Outcome::Skipped(reason) | Outcome::Failed(reason) => {
            output::notice(&reason);
            outputs
                .set("bots", "[]")
                .set("count", 0)
                .set("skipped", true);
        }
    }
    outputs.write(config.output_path.as_deref())
}

fn run_select_key(
    config: &Config,
    provider: &str,
    seed: Option<&str>,
    export_name: Option<&str>,
) -> Result<()> {
    let mut outputs = ActionOutputs::new();
    match dispatch::choose_key(config, provider, seed, export_name) {
        Some(key) => {
            if let Some(env_path) = config.env_path.as_deref() {
                output::add_mask(&key.slot.value);
                output::export_env(env_path, &key.export_name, &key.slot.value)?;
            }
            outputs
                .set("key_name", &key.slot.name)
                .set("export_name", &key.export_name)
                .set("skipped", false);
        }
        None => {
            let base = base_key_name(provider);
            output::notice(&format!(
                "No API key configured for {} (looked for {} and {}_<N>)",
                provider, base, base
            ));
            outputs.set("skipped", true);
        }
    }
    outputs.write(config.output_path.as_deref())
}

async fn run_prompt(config: &Config, args: &EventArgs, out: Option<&Path>) -> Result<()> {
    let plan = match load_plan(config, args)? {
        Outcome::Done(plan) => plan,
        Outcome::Skipped(reason) | Outcome::Failed(reason) => {
            output::notice(&reason);
            return ActionOutputs::new()
                .set("skipped", true)
                .write(config.output_path.as_deref());
        }
    };
    let repo = config.require_repo()?;
    let prompt = dispatch::build_prompt(config, &api(config), repo, &plan.event).await;

    let mut outputs = ActionOutputs::new();
    outputs
        .set("truncated", prompt.truncated)
        .set("skipped", false);
    match out {
        Some(path) => {
            std::fs::write(path, &prompt.text)
                .with_context(|| format!("Failed to write prompt to {}", path.display()))?;
            outputs.set("prompt_file", path.display());
            outputs.write(config.output_path.as_deref())
        }
        None => {
            print!("{}", prompt.text);
            match config.output_path.as_deref() {
                Some(path) => outputs.write(Some(path)),
                None => Ok(()),
            }
        }
    }
}

async fn run_post(config: &Config, target: Option<u64>, body_file: &Path) -> Result<()> {
    let repo = config.require_repo()?;
    let body = std::fs::read_to_string(body_file)
        .with_context(|| format!("Failed to read comment body {}", body_file.display()))?;
    let outcome = post_comment(&api(config), repo, target, &body).await?;
    if let Outcome::Skipped(reason) = &outcome {
        output::notice(reason);
    }
    ActionOutputs::new()
        .set("status", outcome.status())
        .write(config.output_path.as_deref())
}

async fn run_react(config: &Config, args: &EventArgs, reaction: Reaction) -> Result<()> {
    let plan = match load_plan(config, args)? {
        Outcome::Done(plan) => plan,
        Outcome::Skipped(reason) | Outcome::Failed(reason) => {
            output::notice(&reason);
            return ActionOutputs::new()
                .set("status", "skipped")
                .write(config.output_path.as_deref());
        }
    };
    if plan.bots.is_empty() {
        output::notice("No review bots matched this event");
        return ActionOutputs::new()
            .set("status", "skipped")
            .write(config.output_path.as_deref());
    }
    let repo = config.require_repo()?;
    let outcome = react(&api(config), repo, &plan.event, Some(reaction)).await;
    if let Outcome::Failed(error) = &outcome {
        output::warning(&format!("Could not add {} reaction: {}", reaction, error));
    }
    ActionOutputs::new()
        .set("status", outcome.status())
        .write(config.output_path.as_deref())
}

async fn run_bot(config: &Config, args: &EventArgs, bot: &str, model: &str) -> Result<()> {
    let mut outputs = ActionOutputs::new();
    let plan = match load_plan(config, args)? {
        Outcome::Done(plan) => plan,
        Outcome::Skipped(reason) | Outcome::Failed(reason) => {
            output::notice(&reason);
            return outputs
                .set("status", "skipped")
                .set("skipped", true)
                .write(config.output_path.as_deref());
        }
    };

    let run = dispatch::run_bot(config, &api(config), &ai::ProcessRunner, &plan, bot, model).await?;
    match &run.outcome {
        Outcome::Done(()) => {}
        Outcome::Skipped(reason) => output::notice(&format!("{}: {}", bot, reason)),
        Outcome::Failed(error) => {
            output::warning(&format!("{} review failed: {}", bot, error))
        }
    }

    outputs
        .set("status", run.outcome.status())
        .set("skipped", run.outcome.is_skipped())
        .set("truncated", run.prompt_truncated);
    if let Some(key_name) = &run.key_name {
        outputs.set("key_name", key_name);
    }
    outputs.write(config.output_path.as_deref())
}
