use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::{Turn, TurnOutcome};

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub source: String,
    pub role: String, // "user" or "assistant"
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(source: &str, role: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A long-term fact injected into the system prompt on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub category: String,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// A capability the agent can invoke from the model loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter names listed in the generated tool catalogue.
    fn parameters(&self) -> &[&str] {
        &[]
    }

    /// Execute with the parsed `args` object. Errors are surfaced to the
    /// model as tool failures, not to the caller.
    async fn call(&self, args: &Value) -> anyhow::Result<String>;

    /// Reshape the raw output before it is shown to the user. The raw form
    /// is what goes back into the model context.
    fn format_output(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// An outbound messaging surface (console, Telegram, ...).
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> String;

    /// Send text to `target` (channel-specific address) or to the channel's
    /// default destination when None.
    async fn send_text(&self, target: Option<&str>, text: &str) -> anyhow::Result<()>;
}

/// LLM backend. The tool protocol is in-band (JSON in the completion text),
/// so a chat call is just messages in, text out.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, model: &str, messages: &[Value]) -> anyhow::Result<String>;
}

/// Conversation history plus long-term facts.
///
/// Writes are best-effort from the caller's point of view: a failed append
/// must never abort a turn.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, msg: &Message) -> anyhow::Result<()>;

    /// Last `limit` messages in chronological order.
    async fn recent_context(&self, limit: usize) -> anyhow::Result<Vec<Message>>;

    async fn remember_fact(&self, category: &str, key: &str, value: &str) -> anyhow::Result<()>;

    async fn facts(&self) -> anyhow::Result<Vec<Fact>>;
}

/// Executes one admitted turn to completion. The seam between the
/// task manager (admission, cancellation) and the agent loop.
#[async_trait]
pub trait TurnRunner: Send + Sync {
    /// Run the turn, honoring `cancel` at every suspension point.
    /// Returns `Cancelled` when the token fired; provider failures bubble
    /// up as errors for the manager to report.
    async fn run_turn(&self, turn: Turn, cancel: CancellationToken)
        -> anyhow::Result<TurnOutcome>;
}
