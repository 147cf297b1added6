use std::io::ErrorKind;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::keys::{KeyPool, KeySlot};
use crate::outcome::Outcome;

/// A reviewer CLI invocation with `{model}` already filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ReviewerCommand {
    pub fn from_template(template: &[String], model: &str) -> Result<Self> {
        let (program, args) = template
            .split_first()
            .ok_or_else(|| anyhow!("Bot has no reviewer command configured"))?;
        Ok(Self {
            program: program.replace("{model}", model),
            args: args.iter().map(|arg| arg.replace("{model}", model)).collect(),
        })
    }
}

/// Credential handed to the CLI as an environment variable.
#[derive(Debug, Clone)]
pub struct Credential<'a> {
    pub export_name: &'a str,
    pub slot: &'a KeySlot,
}

#[async_trait]
pub trait ReviewerRunner: Send + Sync {
    /// Run the CLI with `prompt` on stdin and return its stdout.
    async fn run(
        &self,
        command: &ReviewerCommand,
        prompt: &str,
        credential: Option<&Credential<'_>>,
    ) -> Result<String>;
}

/// Runs reviewer CLIs as child processes.
pub struct ProcessRunner;

#[async_trait]
impl ReviewerRunner for ProcessRunner {
    async fn run(
        &self,
        command: &ReviewerCommand,
        prompt: &str,
        credential: Option<&Credential<'_>>,
    ) -> Result<String> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(credential) = credential {
            cmd.env(credential.export_name, &credential.slot.value);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {} process", command.program))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("{} stdin was not captured", command.program))?;
        let input = prompt.as_bytes().to_vec();
        let writer = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };

        // feed stdin while draining stdout/stderr so large prompts cannot deadlock
        let (written, output) = tokio::join!(writer, child.wait_with_output());
        let output = output
            .with_context(|| format!("Failed to wait for {} process", command.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} process failed with status {}: {}",
                command.program,
                output.status,
                stderr.trim()
            ));
        }
        if let Err(e) = written {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(e).context("Failed to write prompt to reviewer stdin");
            }
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("{} produced non-UTF-8 output", command.program))
    }
}

/// Run the reviewer, retrying once on the alternate key slot.
///
/// Failures come back as `Outcome::Failed`: a missing review does not fail
/// the pipeline.
pub async fn run_reviewer(
    runner: &dyn ReviewerRunner,
    command: &ReviewerCommand,
    prompt: &str,
    keys: Option<(&KeyPool, &KeySlot)>,
    export_name: &str,
) -> Outcome<String> {
    let credential = keys.map(|(_, slot)| Credential { export_name, slot });

    let first_error = match runner.run(command, prompt, credential.as_ref()).await {
        Ok(output) => return Outcome::Done(output),
        Err(e) => e,
    };
    warn!(
        program = %command.program,
        slot = credential.as_ref().map(|c| c.slot.name.as_str()).unwrap_or("-"),
        error = %format!("{first_error:#}"),
        "Reviewer failed"
    );

    let Some(alternate) = keys.and_then(|(pool, slot)| pool.alternate(slot)) else {
        return Outcome::failed(format!("{first_error:#}"));
    };

    info!(slot = %alternate.name, "Retrying reviewer with alternate key slot");
    let retry = Credential {
        export_name,
        slot: alternate,
    };
    match runner.run(command, prompt, Some(&retry)).await {
        Ok(output) => Outcome::Done(output),
        Err(e) => {
            warn!(slot = %alternate.name, error = %format!("{e:#}"), "Reviewer retry failed");
            Outcome::failed(format!("{e:#}"))
        }
    }
}
