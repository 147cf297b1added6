pub mod prompts;
pub mod runner;

pub use prompts::{build_review_prompt, format_review_comment, Prompt, PromptLimits};
pub use runner::{run_reviewer, Credential, ProcessRunner, ReviewerCommand, ReviewerRunner};
