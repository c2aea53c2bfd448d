// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `botfleet serve` command implementation.
//!
//! Opens SQLite storage, seeds bots from configuration, and runs the
//! lifecycle monitor and dispatcher against Telegram until a shutdown
//! signal arrives.

use std::sync::Arc;

use botfleet_bus::{EventBus, LiveFeed};
use botfleet_config::{BotSeedConfig, FleetConfig};
use botfleet_core::{BotConfig, FleetError, FleetStore, PluginAdapter, SessionLookup};
use botfleet_dispatch::Dispatcher;
use botfleet_journal::{BotStats, LogJournal, LogLevel};
use botfleet_monitor::LifecycleMonitor;
use botfleet_registry::Registry;
use botfleet_storage::SqliteStore;
use botfleet_telegram::TelegramTransport;
use tracing::{debug, error, info, warn};

use crate::shutdown;

/// Runs the `botfleet serve` command.
pub async fn run_serve(config: FleetConfig) -> Result<(), FleetError> {
    init_tracing(&config.fleet.log_level);

    info!(name = %config.fleet.name, "starting botfleet serve");

    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    let store: Arc<dyn FleetStore> = store;

    let registry = Arc::new(Registry::new(
        Arc::clone(&store),
        config.monitor.teardown_timeout(),
    ));
    registry.load().await?;
    let seeded = seed_bots(&registry, &config.bots).await?;
    if seeded > 0 {
        info!(count = seeded, "bots seeded from configuration");
    }

    let bus = Arc::new(EventBus::new());
    let journal = Arc::new(LogJournal::new(&config.journal));
    journal.attach(&bus);
    let stats = Arc::new(BotStats::new());
    stats.attach(&bus);
    let feed = LiveFeed::new(config.journal.feed_capacity);
    feed.attach(&bus);

    let transport = Arc::new(TelegramTransport::new(config.telegram.clone())?);

    let monitor = Arc::new(LifecycleMonitor::new(
        Arc::clone(&registry),
        transport.clone(),
        Arc::clone(&bus),
        config.monitor.clone(),
    ));
    let sessions: Arc<dyn SessionLookup> = monitor.clone();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        sessions,
        transport.clone(),
        Arc::clone(&store),
        Arc::clone(&bus),
        config.dispatch.clone(),
    ));

    journal.record(
        LogLevel::Info,
        Some("fleet"),
        format!("fleet started with {} bots", registry.len()),
        None,
    );

    let cancel = shutdown::install_signal_handler();
    let monitor_task = tokio::spawn(Arc::clone(&monitor).run(cancel.clone()));
    let dispatcher_task = tokio::spawn(Arc::clone(&dispatcher).run(cancel.clone()));

    cancel.cancelled().await;
    info!("shutting down");

    for (name, task) in [("monitor", monitor_task), ("dispatcher", dispatcher_task)] {
        if let Err(e) = task.await {
            error!(component = name, error = %e, "task ended abnormally");
        }
    }

    for (id, counters) in stats.all() {
        info!(
            bot_id = %id,
            sent = counters.sent,
            failed = counters.failed,
            received = counters.received,
            "session totals"
        );
    }
    debug!(clients = feed.client_count(), "live feed closed");
    log_heap_usage();

    if let Err(e) = transport.shutdown().await {
        warn!(error = %e, "transport shutdown failed");
    }
    store.shutdown().await?;
    store.close().await?;
    info!("botfleet stopped");
    Ok(())
}

/// Registers configured bots that storage does not know yet.
///
/// Bots already registered keep their stored state, so a bot disabled by an
/// operator stays disabled across restarts. Returns how many were added.
pub async fn seed_bots(registry: &Registry, seeds: &[BotSeedConfig]) -> Result<usize, FleetError> {
    let mut added = 0;
    for seed in seeds {
        let config = {
            let config = BotConfig::new(seed.id.as_str(), seed.display_name(), seed.token.as_str());
            match &seed.webhook_url {
                Some(url) => config.with_webhook(url.as_str()),
                None => config,
            }
        };
        if registry.contains(&config.id) {
            debug!(bot_id = %config.id, "seed bot already registered");
            continue;
        }
        let bot = registry.register(config).await?;
        if seed.enabled {
            registry.set_desired_enabled(&bot.id, true).await?;
        }
        added += 1;
    }
    Ok(added)
}

#[cfg(not(target_env = "msvc"))]
fn log_heap_usage() {
    // Stats are cached until the epoch advances.
    let _ = tikv_jemalloc_ctl::epoch::advance();
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    debug!(
        allocated_kb = allocated / 1024,
        resident_kb = resident / 1024,
        "heap usage at shutdown"
    );
}

#[cfg(target_env = "msvc")]
fn log_heap_usage() {}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("botfleet={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::BotId;
    use botfleet_test_utils::MockStore;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn seed(id: &str, enabled: bool) -> BotSeedConfig {
        BotSeedConfig {
            id: id.into(),
            name: None,
            token: format!("{id}:token"),
            enabled,
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn seeding_registers_new_bots_with_their_intent() {
        let registry = Registry::new(Arc::new(MockStore::new()), Duration::from_secs(1));
        let added = seed_bots(&registry, &[seed("alpha", true), seed("beta", false)])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert!(registry.get(&BotId::from("alpha")).unwrap().desired_enabled);
        assert!(!registry.get(&BotId::from("beta")).unwrap().desired_enabled);
        assert_eq!(registry.get(&BotId::from("alpha")).unwrap().name, "alpha");
    }

    #[tokio::test]
    #[traced_test]
    async fn seeding_keeps_stored_state() {
        let registry = Registry::new(Arc::new(MockStore::new()), Duration::from_secs(1));
        seed_bots(&registry, &[seed("alpha", true)]).await.unwrap();
        registry
            .set_desired_enabled(&BotId::from("alpha"), false)
            .await
            .unwrap();

        let added = seed_bots(&registry, &[seed("alpha", true)]).await.unwrap();
        assert_eq!(added, 0);
        assert!(logs_contain("seed bot already registered"));
        assert!(!registry.get(&BotId::from("alpha")).unwrap().desired_enabled);
    }
}
