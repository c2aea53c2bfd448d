// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The set of configured bots and operator intent for each.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use botfleet_core::{BotConfig, BotConnection, BotId, ConnectionStatus, FleetError, FleetStore};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::snapshot::Snapshot;
use crate::status::StatusBoard;

/// Ask the lifecycle monitor to close a bot's session.
///
/// The monitor replies on `done` once the session is gone (or there was none).
#[derive(Debug)]
pub struct TeardownRequest {
    pub bot_id: BotId,
    pub done: oneshot::Sender<()>,
}

struct Slot {
    seq: u64,
    bot: Arc<BotConnection>,
}

/// Registry of bot connections.
///
/// Every mutation is written to the store before it becomes visible in
/// memory, and mutations on the same bot id are serialized. Reads never
/// block on mutations of other bots.
pub struct Registry {
    store: Arc<dyn FleetStore>,
    records: DashMap<BotId, Slot>,
    // Per-id mutation locks. An entry is dropped after deregistration once
    // no other caller holds it.
    locks: DashMap<BotId, Arc<Mutex<()>>>,
    next_seq: AtomicU64,
    statuses: Arc<StatusBoard>,
    teardown_tx: mpsc::UnboundedSender<TeardownRequest>,
    teardown_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<TeardownRequest>>>,
    monitor_attached: AtomicBool,
    teardown_timeout: Duration,
}

impl Registry {
    pub fn new(store: Arc<dyn FleetStore>, teardown_timeout: Duration) -> Self {
        let (teardown_tx, teardown_rx) = mpsc::unbounded_channel();
        Self {
            store,
            records: DashMap::new(),
            locks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            statuses: Arc::new(StatusBoard::new()),
            teardown_tx,
            teardown_rx: std::sync::Mutex::new(Some(teardown_rx)),
            monitor_attached: AtomicBool::new(false),
            teardown_timeout,
        }
    }

    /// Populate memory from the store, keeping stored registration order.
    ///
    /// Ids already in memory are left alone. Returns how many were added.
    pub async fn load(&self) -> Result<usize, FleetError> {
        let stored = self.store.load_all_bot_connections().await?;
        let mut added = 0;
        for bot in stored {
            if self.records.contains_key(&bot.id) {
                continue;
            }
            self.insert(bot);
            added += 1;
        }
        info!(count = added, "registry loaded from storage");
        Ok(added)
    }

    /// Register a new bot. It starts with `desired_enabled = false`.
    pub async fn register(&self, config: BotConfig) -> Result<BotConnection, FleetError> {
        if config.id.as_str().trim().is_empty() {
            return Err(FleetError::InvalidInput("bot id must not be empty".into()));
        }
        if config.token.trim().is_empty() {
            return Err(FleetError::InvalidInput(format!(
                "bot `{}` has an empty token",
                config.id
            )));
        }

        let lock = self.lock_for(&config.id);
        let _guard = lock.lock().await;

        if self.records.contains_key(&config.id) {
            return Err(FleetError::DuplicateBot {
                id: config.id.0.clone(),
            });
        }

        let bot = BotConnection::from_config(config, Utc::now());
        self.store.save_bot_connection(&bot).await?;
        self.insert(bot.clone());
        info!(bot_id = %bot.id, name = %bot.name, "bot registered");
        Ok(bot)
    }

    /// Remove a bot.
    ///
    /// Marks it disabled, waits (bounded) for the monitor to close its
    /// session, deletes the stored record and finally drops it from memory.
    /// A concurrent or repeated call for the same id gets `NotFound`.
    pub async fn deregister(&self, id: &BotId) -> Result<(), FleetError> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.deregister_locked(id).await
        };
        drop(lock);
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn deregister_locked(&self, id: &BotId) -> Result<(), FleetError> {
        let current = self.current(id)?;
        if current.desired_enabled {
            self.persist_desired(&current, false).await?;
        }

        self.await_teardown(id).await;

        self.store.delete_bot_connection(id).await?;
        self.records.remove(id);
        info!(bot_id = %id, "bot deregistered");
        Ok(())
    }

    /// Record operator intent. Sessions are opened or closed by the monitor
    /// on its next reconciliation.
    pub async fn set_desired_enabled(
        &self,
        id: &BotId,
        enabled: bool,
    ) -> Result<BotConnection, FleetError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let current = self.current(id)?;
        if current.desired_enabled == enabled {
            return Ok(current.as_ref().clone());
        }
        let updated = self.persist_desired(&current, enabled).await?;
        info!(bot_id = %id, enabled, "desired state changed");
        Ok(updated)
    }

    pub fn get(&self, id: &BotId) -> Result<BotConnection, FleetError> {
        self.current(id).map(|bot| bot.as_ref().clone())
    }

    pub fn contains(&self, id: &BotId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Registered bots in registration order, as of now.
    pub fn list(&self) -> Snapshot {
        let mut slots: Vec<(u64, Arc<BotConnection>)> = self
            .records
            .iter()
            .map(|entry| (entry.seq, Arc::clone(&entry.bot)))
            .collect();
        slots.sort_unstable_by_key(|(seq, _)| *seq);
        Snapshot::new(slots.into_iter().map(|(_, bot)| bot).collect())
    }

    /// Current connectivity status of a registered bot.
    ///
    /// Bots the monitor has not looked at yet report `Offline` since their
    /// registration time.
    pub fn status(&self, id: &BotId) -> Result<ConnectionStatus, FleetError> {
        let bot = self.current(id)?;
        Ok(self
            .statuses
            .get(id)
            .unwrap_or_else(|| ConnectionStatus::offline(bot.created_at)))
    }

    /// The status board, for the lifecycle monitor to write to.
    pub fn status_board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.statuses)
    }

    /// Hand the teardown request stream to the lifecycle monitor.
    ///
    /// Only the first call gets the receiver. From then on `deregister`
    /// waits for the monitor to confirm each teardown.
    pub fn take_teardown_requests(&self) -> Option<mpsc::UnboundedReceiver<TeardownRequest>> {
        let rx = self
            .teardown_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if rx.is_some() {
            self.monitor_attached.store(true, Ordering::SeqCst);
        }
        rx
    }

    fn current(&self, id: &BotId) -> Result<Arc<BotConnection>, FleetError> {
        self.records
            .get(id)
            .map(|slot| Arc::clone(&slot.bot))
            .ok_or_else(|| FleetError::NotFound { id: id.0.clone() })
    }

    fn lock_for(&self, id: &BotId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(id.clone()).or_default().value())
    }

    fn insert(&self, bot: BotConnection) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.records.insert(
            bot.id.clone(),
            Slot {
                seq,
                bot: Arc::new(bot),
            },
        );
    }

    async fn persist_desired(
        &self,
        current: &BotConnection,
        enabled: bool,
    ) -> Result<BotConnection, FleetError> {
        let mut updated = current.clone();
        updated.desired_enabled = enabled;
        updated.updated_at = Utc::now();
        self.store.save_bot_connection(&updated).await?;
        if let Some(mut slot) = self.records.get_mut(&updated.id) {
            slot.bot = Arc::new(updated.clone());
        }
        Ok(updated)
    }

    async fn await_teardown(&self, id: &BotId) {
        if !self.monitor_attached.load(Ordering::SeqCst) {
            return;
        }
        let (done, confirmed) = oneshot::channel();
        let request = TeardownRequest {
            bot_id: id.clone(),
            done,
        };
        if self.teardown_tx.send(request).is_err() {
            debug!(bot_id = %id, "monitor stopped, skipping teardown wait");
            return;
        }
        match tokio::time::timeout(self.teardown_timeout, confirmed).await {
            Ok(Ok(())) => debug!(bot_id = %id, "session teardown confirmed"),
            Ok(Err(_)) => debug!(bot_id = %id, "monitor dropped teardown request"),
            Err(_) => warn!(
                bot_id = %id,
                timeout = ?self.teardown_timeout,
                "session teardown not confirmed in time, continuing"
            ),
        }
    }
}
