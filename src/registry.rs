use std::sync::Arc;

use tracing::info;

use crate::traits::{Channel, Tool};

/// Explicit registration table for tools and channels.
///
/// Everything the agent can reach is listed here at startup; there is no
/// directory scanning or dynamic discovery. What you register is what runs.
#[derive(Default)]
pub struct ComponentRegistry {
    tools: Vec<Arc<dyn Tool>>,
    channels: Vec<Arc<dyn Channel>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        info!(name = tool.name(), desc = tool.description(), "Registered tool");
        self.tools.push(tool);
    }

    pub fn register_channel(&mut self, channel: Arc<dyn Channel>) {
        info!(name = %channel.name(), "Registered channel");
        self.channels.push(channel);
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn channels(&self) -> &[Arc<dyn Channel>] {
        &self.channels
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }
}
