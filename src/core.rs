use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::agent::Agent;
use crate::channels::{ConsoleChannel, TelegramChannel};
use crate::config::AppConfig;
use crate::daemon;
use crate::manager::TaskManager;
use crate::memory::SqliteMemoryStore;
use crate::providers::OpenAiCompatibleProvider;
use crate::registry::ComponentRegistry;
use crate::router::OutputRouter;
use crate::scheduler::Scheduler;
use crate::tools::{RememberFactTool, SystemInfoTool, TerminalTool};
use crate::traits::{MemoryStore, ModelProvider};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Memory store
    let memory: Arc<dyn MemoryStore> = Arc::new(
        SqliteMemoryStore::new(&config.memory.db_path, config.memory.max_facts).await?,
    );

    // 2. Provider
    let provider: Arc<dyn ModelProvider> = Arc::new(
        OpenAiCompatibleProvider::new(&config.provider.base_url, &config.provider.api_key)
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    info!(model = %config.provider.model, "Provider configured");

    // 3. Tools and channels, explicitly registered
    let mut registry = ComponentRegistry::new();
    registry.register_tool(Arc::new(SystemInfoTool));
    registry.register_tool(Arc::new(TerminalTool::new(&config.terminal)));
    registry.register_tool(Arc::new(RememberFactTool::new(Arc::clone(&memory))));

    registry.register_channel(Arc::new(ConsoleChannel));
    let telegram = config.telegram.as_ref().map(|tg| {
        Arc::new(TelegramChannel::new(
            &tg.bot_token,
            tg.allowed_user_ids.clone(),
        ))
    });
    if let Some(telegram) = &telegram {
        registry.register_channel(telegram.clone());
    }
    let registry = Arc::new(registry);

    // 4. Output router
    let router = Arc::new(OutputRouter::new(
        registry.channels().to_vec(),
        &config.daemon.default_channel,
    ));

    // 5. Agent (turn executor)
    let agent = Arc::new(Agent::new(
        provider,
        memory,
        Arc::clone(&registry),
        Arc::clone(&router),
        &config.provider.model,
        &config.agent,
    ));

    // 6. Task manager (single-flight admission)
    let manager = Arc::new(TaskManager::new(
        agent,
        Arc::clone(&router),
        Duration::from_millis(config.agent.preempt_grace_ms),
    ));

    // 7. Scheduler
    let scheduler = Scheduler::from_config(&config.jobs, Arc::clone(&manager));
    if !scheduler.is_empty() {
        tokio::spawn(scheduler.run());
    }

    // 8. IPC server
    {
        let bind = config.daemon.ipc_bind.clone();
        let manager = Arc::clone(&manager);
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            if let Err(e) = daemon::run_ipc_server(&bind, manager, router).await {
                error!("IPC server error: {}", e);
            }
        });
    }

    // 9. Telegram listener
    if let Some(telegram) = telegram {
        let manager = Arc::clone(&manager);
        tokio::spawn(telegram.listen_with_retry(manager));
    }

    info!("factotum v{} running, ctrl-c to stop", env!("CARGO_PKG_VERSION"));
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
