// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator for bot connections and the durable job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FleetError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BotConnection, BotId, JobId, JobRecord, NewJobRecord};

/// Durable storage for the registry and the dispatcher queue.
///
/// Every method may fail with [`FleetError::Storage`]. Only single-record
/// writes are assumed to be atomic.
#[async_trait]
pub trait FleetStore: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), FleetError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), FleetError>;

    // --- Bot connections ---

    /// All stored bot connections in registration order.
    async fn load_all_bot_connections(&self) -> Result<Vec<BotConnection>, FleetError>;

    /// Inserts or replaces one bot connection. Replacing keeps its registration order.
    async fn save_bot_connection(&self, record: &BotConnection) -> Result<(), FleetError>;

    /// Deletes one bot connection. Deleting a missing record is not an error.
    async fn delete_bot_connection(&self, id: &BotId) -> Result<(), FleetError>;

    // --- Job queue ---

    /// Inserts a new pending job with zero attempts and returns the stored row.
    async fn enqueue_job_record(&self, job: &NewJobRecord) -> Result<JobRecord, FleetError>;

    /// Pending jobs due at `now`, oldest first, at most `limit`.
    ///
    /// A job is only returned when no older job for the same (bot, chat)
    /// pair is still pending or processing, so each recipient's jobs come out
    /// strictly in submission order.
    async fn load_due_job_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, FleetError>;

    /// Overwrites the mutable fields (status, attempts, not_before, last_error).
    async fn update_job_record(&self, job: &JobRecord) -> Result<(), FleetError>;

    async fn get_job_record(&self, id: JobId) -> Result<Option<JobRecord>, FleetError>;

    /// Moves jobs left in `processing` (by a crash) back to `pending`.
    /// Returns the number of jobs recovered.
    async fn reset_in_flight_jobs(&self) -> Result<u64, FleetError>;
}
