//! Test infrastructure: MockProvider, CaptureChannel, mock tools and
//! runners, plus harness builders that wire up a real Agent or TaskManager
//! with in-memory state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::manager::TaskManager;
use crate::memory::SqliteMemoryStore;
use crate::registry::ComponentRegistry;
use crate::router::OutputRouter;
use crate::traits::{Channel, ModelProvider, Tool, TurnRunner};
use crate::types::{Turn, TurnOutcome};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Mock model provider that returns scripted completions and records every
/// call's message list.
pub struct MockProvider {
    responses: Mutex<Vec<String>>,
    call_log: Mutex<Vec<Vec<Value>>>,
    delay: Option<Duration>,
}

impl MockProvider {
    /// FIFO queue of scripted completions. When the queue runs dry the
    /// provider answers "Mock response".
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_log: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, so tests can catch the agent mid-call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }

    /// The message lists passed to `chat`, one entry per call.
    pub async fn calls(&self) -> Vec<Vec<Value>> {
        self.call_log.lock().await.clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn chat(&self, _model: &str, messages: &[Value]) -> anyhow::Result<String> {
        self.call_log.lock().await.push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Ok("Mock response".to_string())
        } else {
            Ok(responses.remove(0))
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureChannel
// ---------------------------------------------------------------------------

/// Channel that records everything sent through it.
pub struct CaptureChannel {
    name: String,
    sent: Mutex<Vec<(Option<String>, String)>>,
}

impl CaptureChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// (target, text) pairs in send order.
    pub async fn sent(&self) -> Vec<(Option<String>, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for CaptureChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn send_text(&self, target: Option<&str>, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((target.map(|t| t.to_string()), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock tools
// ---------------------------------------------------------------------------

/// Returns its "text" argument.
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the text argument back"
    }

    fn parameters(&self) -> &[&str] {
        &["text"]
    }

    async fn call(&self, args: &Value) -> anyhow::Result<String> {
        Ok(args["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Always fails.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fails every time"
    }

    async fn call(&self, _args: &Value) -> anyhow::Result<String> {
        anyhow::bail!("simulated tool failure")
    }
}

// ---------------------------------------------------------------------------
// BlockingRunner
// ---------------------------------------------------------------------------

enum RunnerMode {
    /// Wait until finished or cancelled.
    CancelAware,
    /// Wait until finished, ignoring cancellation.
    IgnoreCancel,
    /// Fail immediately with this message.
    Fail(String),
}

/// TurnRunner stand-in for TaskManager tests. Each turn parks until the
/// test calls `finish`, so the slot stays visibly busy.
pub struct BlockingRunner {
    started: AtomicUsize,
    notify: Notify,
    mode: RunnerMode,
}

impl BlockingRunner {
    pub fn new() -> Self {
        Self {
            started: AtomicUsize::new(0),
            notify: Notify::new(),
            mode: RunnerMode::CancelAware,
        }
    }

    pub fn ignoring_cancel() -> Self {
        Self {
            started: AtomicUsize::new(0),
            notify: Notify::new(),
            mode: RunnerMode::IgnoreCancel,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            started: AtomicUsize::new(0),
            notify: Notify::new(),
            mode: RunnerMode::Fail(message.to_string()),
        }
    }

    /// Let one parked turn complete.
    pub fn finish(&self) {
        self.notify.notify_one();
    }

    pub fn finish_one(&self) {
        self.notify.notify_one();
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnRunner for BlockingRunner {
    async fn run_turn(
        &self,
        _turn: Turn,
        cancel: CancellationToken,
    ) -> anyhow::Result<TurnOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            RunnerMode::Fail(message) => anyhow::bail!("{}", message),
            RunnerMode::IgnoreCancel => {
                self.notify.notified().await;
                Ok(TurnOutcome::Completed)
            }
            RunnerMode::CancelAware => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(TurnOutcome::Cancelled),
                    _ = self.notify.notified() => Ok(TurnOutcome::Completed),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Harness builders
// ---------------------------------------------------------------------------

fn test_agent_config() -> AgentConfig {
    AgentConfig {
        persona: "You are a test assistant.".to_string(),
        ..AgentConfig::default()
    }
}

/// Real Agent with mock provider, in-memory state, and a capture console.
pub async fn test_agent(provider: Arc<MockProvider>) -> (Agent, Arc<CaptureChannel>) {
    test_agent_with_tools(provider, Vec::new()).await
}

pub async fn test_agent_with_tools(
    provider: Arc<MockProvider>,
    tools: Vec<Arc<dyn Tool>>,
) -> (Agent, Arc<CaptureChannel>) {
    let console = Arc::new(CaptureChannel::new("console"));

    let mut registry = ComponentRegistry::new();
    for tool in tools {
        registry.register_tool(tool);
    }
    registry.register_channel(console.clone());
    let registry = Arc::new(registry);

    let router = Arc::new(OutputRouter::new(registry.channels().to_vec(), "console"));
    let memory = Arc::new(
        SqliteMemoryStore::in_memory()
            .await
            .expect("in-memory store"),
    );

    let agent = Agent::new(
        provider,
        memory,
        registry,
        router,
        "mock-model",
        &test_agent_config(),
    );
    (agent, console)
}

/// TaskManager over an arbitrary runner, with a short preemption grace so
/// tests stay fast.
pub async fn manager_with_runner(
    runner: Arc<dyn TurnRunner>,
) -> (Arc<TaskManager>, Arc<CaptureChannel>) {
    let console = Arc::new(CaptureChannel::new("console"));
    let router = Arc::new(OutputRouter::new(
        vec![console.clone() as Arc<dyn Channel>],
        "console",
    ));
    let manager = Arc::new(TaskManager::new(
        runner,
        router,
        Duration::from_millis(30),
    ));
    (manager, console)
}

/// Full stack: mock provider feeding the real Agent behind a TaskManager.
pub async fn full_stack(
    provider: Arc<MockProvider>,
    tools: Vec<Arc<dyn Tool>>,
    channels: Vec<Arc<CaptureChannel>>,
) -> (Arc<TaskManager>, Arc<OutputRouter>) {
    let mut registry = ComponentRegistry::new();
    for tool in tools {
        registry.register_tool(tool);
    }
    for channel in channels {
        registry.register_channel(channel);
    }
    let registry = Arc::new(registry);

    let router = Arc::new(OutputRouter::new(registry.channels().to_vec(), "console"));
    let memory = Arc::new(
        SqliteMemoryStore::in_memory()
            .await
            .expect("in-memory store"),
    );

    let agent = Arc::new(Agent::new(
        provider,
        memory,
        registry,
        Arc::clone(&router),
        "mock-model",
        &test_agent_config(),
    ));
    let manager = Arc::new(TaskManager::new(
        agent,
        Arc::clone(&router),
        Duration::from_millis(30),
    ));
    (manager, router)
}
