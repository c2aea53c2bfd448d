// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a registry, lifecycle monitor and dispatcher
//! around [`MockTransport`], with either [`MockStore`] or a temp SQLite
//! database, and runs them in the background with short timings.

use std::sync::Arc;
use std::time::Duration;

use botfleet_bus::EventBus;
use botfleet_config::model::{DispatchConfig, MonitorConfig, StorageConfig};
use botfleet_core::types::{BotConfig, BotConnection, BotId, JobId, JobRecord, StatusKind};
use botfleet_core::{FleetError, FleetStore};
use botfleet_dispatch::Dispatcher;
use botfleet_monitor::LifecycleMonitor;
use botfleet_registry::Registry;
use botfleet_storage::SqliteStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::mock_store::MockStore;
use crate::mock_transport::MockTransport;
use crate::recorder::EventRecorder;

const POLL: Duration = Duration::from_millis(10);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    sqlite: bool,
    monitor: MonitorConfig,
    dispatch: DispatchConfig,
    teardown_timeout: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            sqlite: false,
            monitor: MonitorConfig {
                interval_secs: 1,
                connect_timeout_secs: 1,
                teardown_timeout_secs: 2,
            },
            dispatch: DispatchConfig {
                workers: 4,
                max_attempts: 3,
                backoff_base_ms: 20,
                backoff_max_ms: 200,
                jitter_ms: 0,
                send_timeout_secs: 1,
                poll_interval_ms: 20,
                batch_size: 64,
            },
            teardown_timeout: Duration::from_secs(2),
        }
    }

    /// Back the fleet with a SQLite database in a temp directory.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.dispatch.workers = workers;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.dispatch.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.dispatch.backoff_base_ms = base_ms;
        self.dispatch.backoff_max_ms = max_ms;
        self
    }

    /// Jobs claimed per scheduler pass, which is also each worker's queue depth.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.dispatch.batch_size = batch_size;
        self
    }

    pub fn with_monitor_interval(mut self, secs: u64) -> Self {
        self.monitor.interval_secs = secs;
        self
    }

    /// Build the harness and start the monitor and dispatcher.
    pub async fn build(self) -> Result<TestHarness, FleetError> {
        let mock_store = Arc::new(MockStore::new());
        let (store, temp_dir) = if self.sqlite {
            let temp_dir = tempfile::TempDir::new().map_err(FleetError::storage)?;
            let db_path = temp_dir.path().join("test.db");
            let sqlite = SqliteStore::new(StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            });
            sqlite.initialize().await?;
            let store: Arc<dyn FleetStore> = Arc::new(sqlite);
            (store, Some(temp_dir))
        } else {
            let store: Arc<dyn FleetStore> = mock_store.clone();
            (store, None)
        };

        let bus = Arc::new(EventBus::new());
        let recorder = EventRecorder::attach(&bus);
        let transport = Arc::new(MockTransport::new());
        let registry = Arc::new(Registry::new(Arc::clone(&store), self.teardown_timeout));
        registry.load().await?;

        let monitor = Arc::new(LifecycleMonitor::new(
            Arc::clone(&registry),
            transport.clone(),
            Arc::clone(&bus),
            self.monitor,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            monitor.clone(),
            transport.clone(),
            Arc::clone(&store),
            Arc::clone(&bus),
            self.dispatch,
        ));

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(Arc::clone(&monitor).run(cancel.clone())),
            tokio::spawn(Arc::clone(&dispatcher).run(cancel.clone())),
        ];

        Ok(TestHarness {
            store,
            mock_store,
            bus,
            recorder,
            transport,
            registry,
            monitor,
            dispatcher,
            cancel,
            tasks,
            _temp_dir: temp_dir,
        })
    }
}

/// A running fleet wired to mock adapters.
pub struct TestHarness {
    pub store: Arc<dyn FleetStore>,
    /// The in-memory store; unused when built `with_sqlite`.
    pub mock_store: Arc<MockStore>,
    pub bus: Arc<EventBus>,
    pub recorder: Arc<EventRecorder>,
    pub transport: Arc<MockTransport>,
    pub registry: Arc<Registry>,
    pub monitor: Arc<LifecycleMonitor>,
    pub dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default test settings and an in-memory store.
    pub async fn start() -> Result<Self, FleetError> {
        Self::builder().build().await
    }

    /// Register a bot and leave it disabled.
    pub async fn register(&self, id: &str, token: &str) -> Result<BotConnection, FleetError> {
        self.registry.register(BotConfig::new(id, id, token)).await
    }

    /// Register a bot, enable it and ask the monitor to reconcile.
    pub async fn add_bot(&self, id: &str, token: &str) -> Result<BotConnection, FleetError> {
        self.register(id, token).await?;
        self.set_enabled(id, true).await
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<BotConnection, FleetError> {
        let bot = self
            .registry
            .set_desired_enabled(&BotId::from(id), enabled)
            .await?;
        self.monitor.reconcile_now();
        Ok(bot)
    }

    /// Wait until the bot reports `kind`. Returns `false` on timeout.
    pub async fn wait_for_status(&self, id: &str, kind: StatusKind, timeout: Duration) -> bool {
        let id = BotId::from(id);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self
                .registry
                .status(&id)
                .is_ok_and(|status| status.kind == kind)
            {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Wait until the job reaches a terminal status and return it.
    pub async fn wait_for_job(&self, id: JobId, timeout: Duration) -> Option<JobRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(job) = self.dispatcher.get_job(id).await {
                if job.status.is_terminal() {
                    return Some(job);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Stop the monitor and dispatcher and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
