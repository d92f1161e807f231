use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Opening section of the system prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Hard cap on model calls per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Failed tool executions tolerated before the turn is wrapped up.
    #[serde(default = "default_max_tool_errors")]
    pub max_tool_errors: usize,
    /// Messages of history loaded at the start of each turn.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// How long a preempted turn gets to unwind before a scheduled job
    /// takes the slot.
    #[serde(default = "default_preempt_grace_ms")]
    pub preempt_grace_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            max_iterations: default_max_iterations(),
            max_tool_errors: default_max_tool_errors(),
            context_window: default_context_window(),
            preempt_grace_ms: default_preempt_grace_ms(),
        }
    }
}

fn default_persona() -> String {
    "You are Factotum, a personal assistant running as a background daemon on \
     your user's machine. You are practical and concise. Use your tools when \
     they help; answer directly when they don't."
        .to_string()
}
fn default_max_iterations() -> usize {
    100
}
fn default_max_tool_errors() -> usize {
    5
}
fn default_context_window() -> usize {
    20
}
fn default_preempt_grace_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Loopback address for the line-delimited IPC socket.
    #[serde(default = "default_ipc_bind")]
    pub ipc_bind: String,
    /// Channel used when no better destination is known.
    #[serde(default = "default_channel")]
    pub default_channel: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc_bind: default_ipc_bind(),
            default_channel: default_channel(),
        }
    }
}

fn default_ipc_bind() -> String {
    "127.0.0.1:8989".to_string()
}
fn default_channel() -> String {
    "console".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Maximum number of facts injected into the system prompt. Older facts
    /// stay in the database but are not included.
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_facts: default_max_facts(),
        }
    }
}

fn default_db_path() -> String {
    "factotum.db".to_string()
}
fn default_max_facts() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerminalConfig {
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: default_allowed_prefixes(),
            timeout_secs: default_timeout_secs(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_output_chars() -> usize {
    4000
}
fn default_allowed_prefixes() -> Vec<String> {
    vec![
        "ls".into(),
        "cat".into(),
        "head".into(),
        "tail".into(),
        "echo".into(),
        "date".into(),
        "whoami".into(),
        "pwd".into(),
        "wc".into(),
        "grep".into(),
        "uname".into(),
        "df".into(),
        "du".into(),
        "ps".into(),
        "which".into(),
        "uptime".into(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

/// A scheduled job declared in config. `schedule` accepts a 5-field cron
/// expression or a natural shortcut ("hourly", "every 5m", "daily at 9am").
#[derive(Debug, Deserialize, Clone)]
pub struct JobConfig {
    pub name: String,
    pub schedule: String,
    pub prompt: String,
}
