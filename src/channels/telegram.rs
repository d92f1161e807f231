use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::manager::TaskManager;
use crate::traits::Channel;
use crate::types::{Turn, SOURCE_TELEGRAM};

/// Telegram surface: long-polls for messages from allowed users and sends
/// replies to the chat recorded as the turn's target.
pub struct TelegramChannel {
    bot: Bot,
    allowed_user_ids: Vec<u64>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, allowed_user_ids: Vec<u64>) -> Self {
        Self {
            bot: Bot::new(bot_token),
            allowed_user_ids,
        }
    }

    /// Run the dispatcher forever, restarting with backoff when Telegram
    /// drops the long-poll session.
    pub async fn listen_with_retry(self: Arc<Self>, manager: Arc<TaskManager>) {
        let initial_backoff = Duration::from_secs(5);
        let max_backoff = Duration::from_secs(60);
        let stable_threshold = Duration::from_secs(60);
        let mut backoff = initial_backoff;

        loop {
            info!("Starting Telegram dispatcher");
            let started = tokio::time::Instant::now();
            self.clone().listen(manager.clone()).await;
            let ran_for = started.elapsed();

            // A session that ran for a while was stable; recover quickly
            // from the next drop.
            if ran_for >= stable_threshold {
                backoff = initial_backoff;
            }

            warn!(
                backoff_secs = backoff.as_secs(),
                ran_for_secs = ran_for.as_secs(),
                "Telegram dispatcher stopped, restarting"
            );
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, max_backoff);
        }
    }

    async fn listen(self: Arc<Self>, manager: Arc<TaskManager>) {
        let handler = Update::filter_message().endpoint({
            let channel = Arc::clone(&self);
            move |msg: teloxide::types::Message| {
                let channel = Arc::clone(&channel);
                let manager = Arc::clone(&manager);
                async move {
                    channel.handle_message(msg, manager).await;
                    respond(())
                }
            }
        });

        Dispatcher::builder(self.bot.clone(), handler)
            .build()
            .dispatch()
            .await;
    }

    async fn handle_message(&self, msg: teloxide::types::Message, manager: Arc<TaskManager>) {
        // Fail closed: no allowlist means nobody is allowed.
        let user_id = msg.from.as_ref().map(|u| u.id.0);
        let authorized = user_id
            .map(|id| self.allowed_user_ids.contains(&id))
            .unwrap_or(false);
        if !authorized {
            warn!(user_id = ?user_id, "Ignoring message from unauthorized user");
            return;
        }

        let Some(text) = msg.text() else {
            return;
        };

        let turn = Turn::new(SOURCE_TELEGRAM, Some(msg.chat.id.0.to_string()), text);
        if let Err(e) = manager.submit(turn).await {
            warn!("Failed to submit Telegram message: {}", e);
        }
    }

    fn fallback_chat_id(&self) -> Option<i64> {
        self.allowed_user_ids.first().map(|&id| id as i64)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> String {
        SOURCE_TELEGRAM.to_string()
    }

    async fn send_text(&self, target: Option<&str>, text: &str) -> anyhow::Result<()> {
        let chat_id = target
            .and_then(|t| t.parse::<i64>().ok())
            .or_else(|| self.fallback_chat_id())
            .ok_or_else(|| anyhow::anyhow!("No Telegram chat id to send to"))?;

        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}
