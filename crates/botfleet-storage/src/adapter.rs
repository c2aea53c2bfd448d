// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`FleetStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use botfleet_config::StorageConfig;
use botfleet_core::{
    AdapterType, BotConnection, BotId, FleetError, FleetStore, HealthStatus, JobId, JobRecord,
    NewJobRecord, PluginAdapter,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed fleet store.
///
/// The database is opened by [`FleetStore::initialize`]; every other call
/// fails with a storage error until then.
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, FleetError> {
        self.db
            .get()
            .ok_or_else(|| FleetError::storage("storage not initialized, call initialize() first"))
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, FleetError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FleetError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl FleetStore for SqliteStore {
    async fn initialize(&self) -> Result<(), FleetError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| FleetError::storage("storage already initialized"))?;
        info!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), FleetError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn load_all_bot_connections(&self) -> Result<Vec<BotConnection>, FleetError> {
        queries::bots::load_all(self.db()?).await
    }

    async fn save_bot_connection(&self, record: &BotConnection) -> Result<(), FleetError> {
        queries::bots::save(self.db()?, record).await
    }

    async fn delete_bot_connection(&self, id: &BotId) -> Result<(), FleetError> {
        queries::bots::delete(self.db()?, id).await.map(|_| ())
    }

    async fn enqueue_job_record(&self, job: &NewJobRecord) -> Result<JobRecord, FleetError> {
        queries::jobs::enqueue(self.db()?, job).await
    }

    async fn load_due_job_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, FleetError> {
        queries::jobs::load_due(self.db()?, now, limit).await
    }

    async fn update_job_record(&self, job: &JobRecord) -> Result<(), FleetError> {
        queries::jobs::update(self.db()?, job).await
    }

    async fn get_job_record(&self, id: JobId) -> Result<Option<JobRecord>, FleetError> {
        queries::jobs::get(self.db()?, id).await
    }

    async fn reset_in_flight_jobs(&self) -> Result<u64, FleetError> {
        queries::jobs::reset_in_flight(self.db()?).await
    }
}
