use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::traits::Channel;
use crate::types::SOURCE_SCHEDULER;

/// Routes outbound text back to the surface that should receive it.
///
/// Two routing tables are kept. `active_targets` maps a channel-backed
/// source to its last reply address and drives the scheduler broadcast.
/// `live_destinations` holds the write halves of open IPC connections;
/// entries are pruned the moment a write fails.
pub struct OutputRouter {
    channels: Vec<Arc<dyn Channel>>,
    default_channel: String,
    active_targets: RwLock<HashMap<String, Option<String>>>,
    live_destinations: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl OutputRouter {
    pub fn new(channels: Vec<Arc<dyn Channel>>, default_channel: &str) -> Self {
        Self {
            channels,
            default_channel: default_channel.to_string(),
            active_targets: RwLock::new(HashMap::new()),
            live_destinations: RwLock::new(HashMap::new()),
        }
    }

    fn channel(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Record that a channel-backed source was just admitted, so scheduler
    /// broadcasts can reach it later. Live connections and the scheduler
    /// itself are not recorded here.
    pub async fn record_activity(&self, source: &str, target: Option<&str>) {
        if source == SOURCE_SCHEDULER || self.live_destinations.read().await.contains_key(source) {
            return;
        }
        self.active_targets
            .write()
            .await
            .insert(source.to_string(), target.map(|t| t.to_string()));
    }

    /// Register the write half of a live connection.
    pub async fn register_live(&self, source: &str, tx: mpsc::Sender<String>) {
        info!(source = %source, "Live destination connected");
        self.live_destinations
            .write()
            .await
            .insert(source.to_string(), tx);
    }

    pub async fn unregister_live(&self, source: &str) {
        if self
            .live_destinations
            .write()
            .await
            .remove(source)
            .is_some()
        {
            info!(source = %source, "Live destination disconnected");
        }
    }

    /// Deliver `text` on behalf of `source`, using the target recorded at
    /// admission. Never fails; undeliverable text is logged and dropped
    /// only after the default channel has been tried.
    pub async fn deliver(&self, source: &str, text: &str) {
        let recorded = self.active_targets.read().await.get(source).cloned();
        self.deliver_to(source, recorded.flatten().as_deref(), text)
            .await;
    }

    /// Deliver with an explicit reply address, bypassing `active_targets`.
    /// Used for notices about turns that were never admitted.
    pub async fn deliver_to(&self, source: &str, target: Option<&str>, text: &str) {
        if source == SOURCE_SCHEDULER {
            self.broadcast(text).await;
            return;
        }

        // Live connection first.
        if self.send_live(source, text).await {
            return;
        }

        // Channel named after the source, else the default channel.
        let channel = self
            .channel(source)
            .or_else(|| self.channel(&self.default_channel));
        match channel {
            Some(ch) => {
                if let Err(e) = ch.send_text(target, text).await {
                    warn!(source = %source, channel = %ch.name(), "Delivery failed: {}", e);
                }
            }
            None => warn!(source = %source, "No channel available, dropping output"),
        }
    }

    /// Scheduler output goes to every recently active surface and every
    /// live connection. Falls back to the default channel when nothing
    /// was reachable.
    async fn broadcast(&self, text: &str) {
        let mut reached = 0usize;

        let targets = self.active_targets.read().await.clone();
        for (source, target) in &targets {
            let Some(channel) = self.channel(source) else {
                debug!(source = %source, "No channel for active source, skipping");
                continue;
            };
            match channel.send_text(target.as_deref(), text).await {
                Ok(()) => reached += 1,
                Err(e) => {
                    warn!(source = %source, "Broadcast delivery failed: {}", e)
                }
            }
        }

        let live: Vec<String> = self
            .live_destinations
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        for source in live {
            if self.send_live(&source, text).await {
                reached += 1;
            }
        }

        if reached == 0 {
            if let Some(ch) = self.channel(&self.default_channel) {
                if let Err(e) = ch.send_text(None, text).await {
                    warn!("Default channel delivery failed: {}", e);
                }
            } else {
                warn!("No default channel, dropping scheduler output");
            }
        }
    }

    /// Try the live destination for `source`. A failed send means the
    /// connection is gone; the entry is pruned.
    async fn send_live(&self, source: &str, text: &str) -> bool {
        let tx = self.live_destinations.read().await.get(source).cloned();
        let Some(tx) = tx else {
            return false;
        };
        if tx.send(text.to_string()).await.is_ok() {
            true
        } else {
            warn!(source = %source, "Live destination gone, pruning");
            self.unregister_live(source).await;
            false
        }
    }
}
