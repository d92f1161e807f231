use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::registry::ComponentRegistry;
use crate::router::OutputRouter;
use crate::toolcall::{parse_tool_call, ParsedToolCall};
use crate::traits::{MemoryStore, Message, ModelProvider, TurnRunner};
use crate::types::{Turn, TurnOutcome};

/// The bounded model/tool loop that executes one admitted turn.
///
/// Each model call and each tool execution sits behind a `select!` on the
/// cancellation token, so a "stop" or a preemption takes effect at the next
/// suspension point rather than at the end of the turn.
pub struct Agent {
    provider: Arc<dyn ModelProvider>,
    memory: Arc<dyn MemoryStore>,
    registry: Arc<ComponentRegistry>,
    router: Arc<OutputRouter>,
    model: String,
    persona: String,
    max_iterations: usize,
    max_tool_errors: usize,
    context_window: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        memory: Arc<dyn MemoryStore>,
        registry: Arc<ComponentRegistry>,
        router: Arc<OutputRouter>,
        model: &str,
        config: &AgentConfig,
    ) -> Self {
        Self {
            provider,
            memory,
            registry,
            router,
            model: model.to_string(),
            persona: config.persona.clone(),
            max_iterations: config.max_iterations,
            max_tool_errors: config.max_tool_errors,
            context_window: config.context_window,
        }
    }

    /// Persona, then long-term facts, then the generated tool catalogue with
    /// the JSON-only instruction.
    async fn build_system_prompt(&self) -> String {
        let mut prompt = self.persona.clone();

        match self.memory.facts().await {
            Ok(facts) if !facts.is_empty() => {
                prompt.push_str("\n\n=== THINGS YOU KNOW ===\n");
                for fact in facts {
                    prompt.push_str(&format!(
                        "- {}/{}: {}\n",
                        fact.category, fact.key, fact.value
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to load facts for system prompt: {}", e),
        }

        prompt.push_str("\n=== AVAILABLE TOOLS ===\n");
        for tool in self.registry.tools() {
            prompt.push_str(&format!(
                "- {}({}): {}\n",
                tool.name(),
                tool.parameters().join(", "),
                tool.description()
            ));
        }
        prompt.push_str(
            "\nTo use a tool, respond with ONLY a JSON object of the form \
             {\"tool\": \"<name>\", \"args\": {...}, \"message\": \"<optional status shown to the user>\"}. \
             Your response must contain ONLY the JSON object, nothing else. \
             To answer the user directly, respond with plain text and no JSON object.",
        );
        prompt
    }

    /// Best-effort history write. A dead database must not kill the turn.
    async fn persist(&self, msg: Message) {
        if let Err(e) = self.memory.append(&msg).await {
            warn!(role = %msg.role, "Failed to persist message: {}", e);
        }
    }

    /// Run the named tool. Failures come back as an error string for the
    /// model, plus a flag so the loop can count them against the budget.
    /// Returns None when the cancellation token fired mid-execution.
    async fn execute_tool(
        &self,
        call: &ParsedToolCall,
        cancel: &CancellationToken,
    ) -> Option<(String, String, bool)> {
        let Some(tool) = self.registry.tool(&call.tool) else {
            let text = format!("Error: Tool '{}' not found or not enabled.", call.tool);
            return Some((text.clone(), text, true));
        };

        let args = Value::Object(call.args.clone());
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            r = tool.call(&args) => r,
        };

        match result {
            Ok(raw) => {
                let formatted = tool.format_output(&raw);
                Some((raw, formatted, false))
            }
            Err(e) => {
                warn!(tool = %call.tool, "Tool execution failed: {}", e);
                let text = format!("Error executing tool '{}': {}", call.tool, e);
                Some((text.clone(), text, true))
            }
        }
    }
}

const WRAP_UP_NOTE: &str = "You have used up the tool budget for this request. \
     Give your final answer now as plain text. Do not call any more tools.";

#[async_trait]
impl TurnRunner for Agent {
    async fn run_turn(
        &self,
        turn: Turn,
        cancel: CancellationToken,
    ) -> anyhow::Result<TurnOutcome> {
        info!(source = %turn.source, "Starting turn");

        let system_prompt = self.build_system_prompt().await;

        // Loop-local context: persisted history, then this request, then
        // whatever the loop accumulates (assistant output, tool results).
        let mut context: Vec<Value> = Vec::new();
        match self.memory.recent_context(self.context_window).await {
            Ok(history) => {
                for msg in history {
                    context.push(json!({"role": msg.role, "content": msg.content}));
                }
            }
            Err(e) => warn!("Failed to load history, starting fresh: {}", e),
        }
        context.push(json!({"role": "user", "content": turn.text}));
        self.persist(Message::new(&turn.source, "user", &turn.text))
            .await;

        let mut iterations = 0usize;
        let mut tool_errors = 0usize;
        let mut wrapping_up = false;

        loop {
            let mut messages = vec![json!({"role": "system", "content": system_prompt})];
            if wrapping_up {
                messages.push(json!({"role": "system", "content": WRAP_UP_NOTE}));
            }
            messages.extend(context.iter().cloned());

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(source = %turn.source, "Turn cancelled at model call");
                    return Ok(TurnOutcome::Cancelled);
                }
                r = self.provider.chat(&self.model, &messages) => r?,
            };
            iterations += 1;
            context.push(json!({"role": "assistant", "content": response}));

            // After the wrap-up note the reply is final no matter what it
            // looks like.
            let parsed = if wrapping_up {
                None
            } else {
                parse_tool_call(&response)
            };

            let Some(call) = parsed else {
                self.persist(Message::new(&turn.source, "assistant", &response))
                    .await;
                self.router.deliver(&turn.source, &response).await;
                info!(source = %turn.source, iterations, "Turn completed");
                return Ok(TurnOutcome::Completed);
            };

            debug!(tool = %call.tool, iteration = iterations, "Model requested tool");
            let notice = call
                .message
                .clone()
                .unwrap_or_else(|| format!("🤖 Calling tool: `{}`", call.tool));
            self.router.deliver(&turn.source, &notice).await;

            let Some((raw, formatted, failed)) = self.execute_tool(&call, &cancel).await else {
                info!(source = %turn.source, "Turn cancelled during tool execution");
                return Ok(TurnOutcome::Cancelled);
            };
            if failed {
                tool_errors += 1;
            }
            if !formatted.is_empty() {
                self.router.deliver(&turn.source, &formatted).await;
            }
            context.push(json!({
                "role": "user",
                "content": format!("[TOOL RESULT for {}]: {}", call.tool, raw),
            }));

            if iterations >= self.max_iterations || tool_errors >= self.max_tool_errors {
                warn!(
                    source = %turn.source,
                    iterations,
                    tool_errors,
                    "Budget exhausted, forcing final answer"
                );
                wrapping_up = true;
            }
        }
    }
}
