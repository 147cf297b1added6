use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// REST calls the dispatcher needs from GitHub.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn get(&self, endpoint: &str) -> Result<Value>;

    /// Follow every page and flatten the array results into one list.
    async fn get_paginated(&self, endpoint: &str) -> Result<Vec<Value>>;

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value>;
}

/// [`GitHubApi`] backed by the `gh api` command.
pub struct GhCli {
    token: Option<String>,
}

impl GhCli {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    fn command(&self, method: &str, endpoint: &str) -> Command {
        let mut cmd = Command::new("gh");
        cmd.arg("api")
            .arg("-X")
            .arg(method)
            .arg(endpoint)
            .arg("-H")
            .arg("Accept: application/vnd.github+json");
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }
        cmd
    }

    async fn run(&self, mut cmd: Command, stdin: Option<Vec<u8>>, endpoint: &str) -> Result<Vec<u8>> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn gh process")?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("gh stdin was not captured"))?;
            pipe.write_all(&input)
                .await
                .context("Failed to write request body to gh")?;
            // close stdin so gh sees EOF
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for gh process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gh api {} failed: {}", endpoint, stderr.trim()));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl GitHubApi for GhCli {
    async fn get(&self, endpoint: &str) -> Result<Value> {
        debug!(endpoint, "GET");
        let stdout = self.run(self.command("GET", endpoint), None, endpoint).await?;
        serde_json::from_slice(&stdout)
            .with_context(|| format!("Failed to parse response from {}", endpoint))
    }

    async fn get_paginated(&self, endpoint: &str) -> Result<Vec<Value>> {
        debug!(endpoint, "GET (paginated)");
        let mut cmd = self.command("GET", endpoint);
        cmd.arg("--paginate");
        let stdout = self.run(cmd, None, endpoint).await?;
        parse_pages(&stdout).with_context(|| format!("Failed to parse pages from {}", endpoint))
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        debug!(endpoint, "POST");
        let mut cmd = self.command("POST", endpoint);
        cmd.arg("--input").arg("-");
        let input = serde_json::to_vec(body)?;
        let stdout = self.run(cmd, Some(input), endpoint).await?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&stdout)
            .with_context(|| format!("Failed to parse response from {}", endpoint))
    }
}

/// `gh api --paginate` prints one JSON document per page back to back.
fn parse_pages(stdout: &[u8]) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_slice(stdout).into_iter::<Value>() {
        match page? {
            Value::Array(values) => items.extend(values),
            other => items.push(other),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pages_flattens_arrays() {
        let stdout = br#"[{"sha":"a"},{"sha":"b"}][{"sha":"c"}]
"#;
        let items = parse_pages(stdout).unwrap();
        assert_eq!(items, vec![json!({"sha":"a"}), json!({"sha":"b"}), json!({"sha":"c"})]);
    }

    #[test]
    fn test_parse_pages_empty_output() {
        assert!(parse_pages(b"").unwrap().is_empty());
        assert!(parse_pages(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_pages_rejects_garbage() {
        assert!(parse_pages(b"[{\"sha\":").is_err());
    }
}
