use serde::Deserialize;

use crate::github::{FileChange, PullRequestContext};

pub const PATCH_TRUNCATED_MARKER: &str = "... (patch truncated)";
pub const PROMPT_TRUNCATED_MARKER: &str = "\n... (prompt truncated)";
pub const NO_FILES_PLACEHOLDER: &str = "No changed files were found.";
pub const NO_COMMITS_PLACEHOLDER: &str = "No commits were found.";
const NO_DESCRIPTION_PLACEHOLDER: &str = "(No description provided)";

/// Size limits, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromptLimits {
    /// Per-file patch budget.
    pub patch_budget: usize,
    /// Hard cap on the whole prompt.
    pub max_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            patch_budget: 1500,
            max_chars: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub truncated: bool,
}

/// Build the reviewer prompt for a PR or issue.
///
/// Output depends only on the inputs, so the same context always renders
/// byte-for-byte the same prompt.
pub fn build_review_prompt(
    context: &PullRequestContext,
    user_request: Option<&str>,
    limits: &PromptLimits,
) -> Prompt {
    let mut truncated = false;

    let (kind, identity) = match &context.pr {
        Some(pr) if pr.is_pull_request => {
            let mut line = format!("Pull request #{}: {}", pr.number, pr.title);
            if !pr.author.is_empty() {
                line.push_str(&format!(" by @{}", pr.author));
            }
            if let Some(url) = &pr.url {
                line.push_str(&format!(" ({})", url));
            }
            ("pull request", line)
        }
        Some(issue) => ("issue", format!("Issue #{}: {}", issue.number, issue.title)),
        None => (
            "pull request",
            "Pull request details are unavailable.".to_string(),
        ),
    };

    let files_text = if context.files.is_empty() {
        NO_FILES_PLACEHOLDER.to_string()
    } else {
        context
            .files
            .iter()
            .map(|file| {
                let (text, cut) = render_file(file, limits.patch_budget);
                truncated |= cut;
                text
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let commits_text = if context.commits.is_empty() {
        NO_COMMITS_PLACEHOLDER.to_string()
    } else {
        context
            .commits
            .iter()
            .map(|c| format!("- {} {}", c.short_sha(), c.headline()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let description = context
        .pr
        .as_ref()
        .and_then(|pr| pr.description.as_deref())
        .unwrap_or(NO_DESCRIPTION_PLACEHOLDER);

    let request = match user_request.map(str::trim) {
        Some(req) if !req.is_empty() => format!("\n### Additional request\n{}\n", req),
        _ => String::new(),
    };

    let text = format!(
        r#"You are a code reviewer for a GitHub {kind}.

Review the changes below. Look for bugs, security vulnerabilities, performance concerns and missing tests.
Be specific: cite file paths and line numbers. Do not restate the diff.

## Response Format

Structure your answer with exactly these headings:

### Summary
### Issues
### Suggestions

## Context

Repository: {repo}
{identity}

### Changed Files
{files}

### Commits
{commits}

### Description
{description}
{request}"#,
        kind = kind,
        repo = context.repo,
        identity = identity,
        files = files_text,
        commits = commits_text,
        description = description,
        request = request,
    );

    let (text, cut) = cap_length(text, limits.max_chars);
    Prompt {
        text,
        truncated: truncated || cut,
    }
}

/// One file entry plus its (possibly truncated) diff. Returns whether the
/// patch was cut.
pub fn render_file(file: &FileChange, patch_budget: usize) -> (String, bool) {
    let mut out = format!(
        "- {} ({}, +{} / -{})",
        file.path, file.status, file.additions, file.deletions
    );
    let Some(patch) = file.patch.as_deref().filter(|p| !p.is_empty()) else {
        return (out, false);
    };

    let kept = floor_to_char_boundary(patch, patch_budget);
    let cut = kept.len() < patch.len();
    out.push_str("\n```diff\n");
    out.push_str(kept.trim_end_matches('\n'));
    if cut {
        out.push('\n');
        out.push_str(PATCH_TRUNCATED_MARKER);
    }
    out.push_str("\n```");
    (out, cut)
}

/// Wrap a bot's raw output as the comment that gets posted.
pub fn format_review_comment(bot: &str, output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        return String::new();
    }
    format!("### {} review\n\n{}\n", bot, output)
}

fn cap_length(mut text: String, max: usize) -> (String, bool) {
    if text.len() <= max {
        return (text, false);
    }
    if max < PROMPT_TRUNCATED_MARKER.len() {
        let keep = floor_to_char_boundary(&text, max).len();
        text.truncate(keep);
        return (text, true);
    }
    let keep = floor_to_char_boundary(&text, max - PROMPT_TRUNCATED_MARKER.len()).len();
    text.truncate(keep);
    text.push_str(PROMPT_TRUNCATED_MARKER);
    (text, true)
}

fn floor_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
