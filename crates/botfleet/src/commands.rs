// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands that work directly on the durable store.
//!
//! These never open transport sessions. A running `serve` picks up queued
//! jobs on its next poll; registry changes take effect on its next start.

use std::fmt::Write as _;
use std::sync::Arc;

use botfleet_bus::EventBus;
use botfleet_config::FleetConfig;
use botfleet_core::types::mask_token;
use botfleet_core::{
    BotConfig, BotId, FleetError, FleetStore, JobId, NoSessions, OutboundJob,
};
use botfleet_dispatch::Dispatcher;
use botfleet_registry::Registry;
use botfleet_storage::SqliteStore;
use botfleet_telegram::TelegramTransport;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum BotsAction {
    /// List registered bots in registration order.
    List,
    /// Register a bot. It stays disabled unless --enable is given.
    Add {
        id: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        webhook: Option<String>,
        #[arg(long)]
        enable: bool,
    },
    /// Deregister a bot.
    Remove { id: String },
    /// Mark a bot for connection.
    Enable { id: String },
    /// Mark a bot for disconnection.
    Disable { id: String },
}

pub async fn run_bots(config: &FleetConfig, action: BotsAction) -> Result<(), FleetError> {
    let store = open_store(config).await?;
    let registry = open_registry(config, Arc::clone(&store)).await?;
    let output = bots_command(&registry, action).await;
    store.close().await?;
    print!("{}", output?);
    Ok(())
}

pub async fn run_send(
    config: &FleetConfig,
    bot: String,
    chat: String,
    text: String,
) -> Result<(), FleetError> {
    let store = open_store(config).await?;
    let registry = open_registry(config, Arc::clone(&store)).await?;
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(NoSessions),
        Arc::new(TelegramTransport::new(config.telegram.clone())?),
        Arc::clone(&store),
        Arc::new(EventBus::new()),
        config.dispatch.clone(),
    );
    let id = dispatcher.enqueue(OutboundJob::text(bot, chat.as_str(), text)).await?;
    store.close().await?;
    println!("queued job {id}");
    Ok(())
}

pub async fn run_job(config: &FleetConfig, id: i64) -> Result<(), FleetError> {
    let store = open_store(config).await?;
    let job = store
        .get_job_record(JobId(id))
        .await?
        .ok_or(FleetError::JobNotFound { id })?;
    store.close().await?;
    let json = serde_json::to_string_pretty(&job)
        .map_err(|e| FleetError::Internal(format!("failed to render job: {e}")))?;
    println!("{json}");
    Ok(())
}

pub fn run_config(config: &FleetConfig) -> Result<(), FleetError> {
    let rendered = toml::to_string_pretty(&masked(config))
        .map_err(|e| FleetError::Config(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

/// Applies a bots action and returns what to print.
pub async fn bots_command(registry: &Registry, action: BotsAction) -> Result<String, FleetError> {
    match action {
        BotsAction::List => Ok(bot_table(registry)),
        BotsAction::Add {
            id,
            token,
            name,
            webhook,
            enable,
        } => {
            let name = name.unwrap_or_else(|| id.clone());
            let mut config = BotConfig::new(id, name, token);
            if let Some(url) = webhook {
                config = config.with_webhook(url);
            }
            let bot = registry.register(config).await?;
            if enable {
                registry.set_desired_enabled(&bot.id, true).await?;
            }
            Ok(format!(
                "registered {} ({})\n",
                bot.id,
                if enable { "enabled" } else { "disabled" }
            ))
        }
        BotsAction::Remove { id } => {
            registry.deregister(&BotId::from(id.as_str())).await?;
            Ok(format!("removed {id}\n"))
        }
        BotsAction::Enable { id } => {
            registry.set_desired_enabled(&BotId::from(id.as_str()), true).await?;
            Ok(format!("enabled {id}\n"))
        }
        BotsAction::Disable { id } => {
            registry.set_desired_enabled(&BotId::from(id.as_str()), false).await?;
            Ok(format!("disabled {id}\n"))
        }
    }
}

fn bot_table(registry: &Registry) -> String {
    let bots = registry.list();
    if bots.is_empty() {
        return "no bots registered\n".to_string();
    }
    let mut out = format!("{:<20} {:<24} {:<8} {}\n", "ID", "NAME", "ENABLED", "TOKEN");
    for bot in bots.iter() {
        let _ = writeln!(
            out,
            "{:<20} {:<24} {:<8} {}",
            bot.id,
            bot.name,
            if bot.desired_enabled { "yes" } else { "no" },
            mask_token(&bot.token)
        );
    }
    out
}

/// Copy of the config safe to print: bot tokens are masked.
fn masked(config: &FleetConfig) -> FleetConfig {
    let mut config = config.clone();
    for bot in &mut config.bots {
        bot.token = mask_token(&bot.token);
    }
    config
}

async fn open_store(config: &FleetConfig) -> Result<Arc<dyn FleetStore>, FleetError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    Ok(Arc::new(store))
}

async fn open_registry(
    config: &FleetConfig,
    store: Arc<dyn FleetStore>,
) -> Result<Arc<Registry>, FleetError> {
    let registry = Arc::new(Registry::new(store, config.monitor.teardown_timeout()));
    registry.load().await?;
    Ok(registry)
}
