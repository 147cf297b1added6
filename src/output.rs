//! GitHub Actions plumbing: step outputs, env exports and workflow commands.
//!
//! Workflow commands go to stdout because that is where the runner reads
//! them; diagnostics go through `tracing` on stderr.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

const HEREDOC_DELIMITER: &str = "PRBOTS_EOF";

/// Ordered `key=value` step outputs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionOutputs {
    pairs: Vec<(String, String)>,
}

impl ActionOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Display) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render in the `GITHUB_OUTPUT` file format.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for (key, value) in &self.pairs {
            out.push_str(&assignment(key, value)?);
        }
        Ok(out)
    }

    /// Append to the `GITHUB_OUTPUT` file, or print to stdout outside Actions.
    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        let rendered = self.render()?;
        match path {
            Some(path) => append(path, &rendered),
            None => {
                print!("{}", rendered);
                Ok(())
            }
        }
    }
}

/// Export `name=value` to later steps through the `GITHUB_ENV` file.
pub fn export_env(path: &Path, name: &str, value: &str) -> Result<()> {
    append(path, &assignment(name, value)?)
}

pub fn notice(message: &str) {
    println!("::notice::{}", escape_data(message));
}

pub fn warning(message: &str) {
    println!("::warning::{}", escape_data(message));
}

pub fn error(message: &str) {
    println!("::error::{}", escape_data(message));
}

/// Ask the runner to redact `value` from all later log output.
pub fn add_mask(value: &str) {
    println!("::add-mask::{}", escape_data(value));
}

fn assignment(key: &str, value: &str) -> Result<String> {
    if !value.contains('\n') {
        return Ok(format!("{}={}\n", key, value));
    }
    if value.lines().any(|line| line == HEREDOC_DELIMITER) {
        bail!("value for {} contains the output delimiter", key);
    }
    Ok(format!(
        "{key}<<{delim}\n{value}\n{delim}\n",
        key = key,
        delim = HEREDOC_DELIMITER,
        value = value
    ))
}

fn append(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

// workflow command data escaping
fn escape_data(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_line() {
        let mut outputs = ActionOutputs::new();
        outputs.set("bots", r#"["claude"]"#).set("count", 1);
        assert_eq!(outputs.render().unwrap(), "bots=[\"claude\"]\ncount=1\n");
        assert_eq!(outputs.get("count"), Some("1"));
    }

    #[test]
    fn test_render_multi_line_uses_heredoc() {
        let mut outputs = ActionOutputs::new();
        outputs.set("summary", "line one\nline two");
        assert_eq!(
            outputs.render().unwrap(),
            "summary<<PRBOTS_EOF\nline one\nline two\nPRBOTS_EOF\n"
        );
    }

    #[test]
    fn test_delimiter_collision_is_error() {
        let mut outputs = ActionOutputs::new();
        outputs.set("evil", "a\nPRBOTS_EOF\nb");
        assert!(outputs.render().is_err());
    }

    #[test]
    fn test_write_appends_to_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut first = ActionOutputs::new();
        first.set("a", 1);
        first.write(Some(file.path())).unwrap();
        let mut second = ActionOutputs::new();
        second.set("b", 2);
        second.write(Some(file.path())).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "a=1\nb=2\n");
    }

    #[test]
    fn test_export_env() {
        let file = tempfile::NamedTempFile::new().unwrap();
        export_env(file.path(), "OPENAI_API_KEY", "sk-1").unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "OPENAI_API_KEY=sk-1\n");
    }

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("100%\r\ndone"), "100%25%0D%0Adone");
    }
}
