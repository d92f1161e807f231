use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::TerminalConfig;
use crate::traits::Tool;

/// Runs shell commands from a configured prefix allowlist.
pub struct TerminalTool {
    allowed_prefixes: Vec<String>,
    timeout: Duration,
    max_output_chars: usize,
}

#[derive(Deserialize)]
struct TerminalArgs {
    command: String,
}

impl TerminalTool {
    pub fn new(config: &TerminalConfig) -> Self {
        Self {
            allowed_prefixes: config.allowed_prefixes.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_chars: config.max_output_chars,
        }
    }

    fn is_allowed(&self, command: &str) -> bool {
        let command = command.trim();
        if contains_shell_operator(command) {
            return false;
        }
        // A prefix only matches a whole word: "ls" allows "ls -la" but must
        // not allow "lsblk".
        self.allowed_prefixes.iter().any(|p| {
            command == p.as_str()
                || command.starts_with(&format!("{} ", p))
                || command.starts_with(&format!("{}\t", p))
        })
    }
}

/// Prefix matches must not smuggle extra commands past the allowlist, so
/// anything with an operator is rejected outright.
fn contains_shell_operator(cmd: &str) -> bool {
    for ch in [';', '|', '`', '\n', '&', '>', '<'] {
        if cmd.contains(ch) {
            return true;
        }
    }
    cmd.contains("$(")
}

/// Combine stdout/stderr, truncating at a char boundary.
fn render_output(stdout: &str, stderr: &str, max_chars: usize) -> String {
    let mut result = String::new();
    if !stdout.is_empty() {
        result.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !result.is_empty() {
            result.push_str("\n--- stderr ---\n");
        }
        result.push_str(stderr);
    }
    if result.is_empty() {
        result.push_str("(no output)");
    }
    if result.len() > max_chars {
        let mut end = max_chars;
        while end > 0 && !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
        result.push_str("\n... (truncated)");
    }
    result
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "terminal"
    }

    fn description(&self) -> &str {
        "Run a shell command from the pre-approved allowlist"
    }

    fn parameters(&self) -> &[&str] {
        &["command"]
    }

    async fn call(&self, args: &Value) -> anyhow::Result<String> {
        let args: TerminalArgs = serde_json::from_value(args.clone())?;
        let command = args.command.trim();

        if !self.is_allowed(command) {
            warn!(command, "Command rejected by allowlist");
            anyhow::bail!(
                "Command '{}' is not in the allowed list. \
                 Allowed prefixes: {}",
                command,
                self.allowed_prefixes.join(", ")
            );
        }

        info!(command, "Running terminal command");
        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => anyhow::bail!(
                "Command timed out after {}s: {}",
                self.timeout.as_secs(),
                command
            ),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(render_output(
            stdout.trim(),
            stderr.trim(),
            self.max_output_chars,
        ))
    }

    fn format_output(&self, raw: &str) -> String {
        format!("```\n{}\n```", raw)
    }
}
