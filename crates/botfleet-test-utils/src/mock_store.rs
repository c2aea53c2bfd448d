// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory fleet store for deterministic testing.
//!
//! `MockStore` follows the same queue rules as the SQLite store: job ids
//! increase in submission order and a job is not due while an older job for
//! the same recipient is unfinished.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use botfleet_core::traits::adapter::PluginAdapter;
use botfleet_core::traits::storage::FleetStore;
use botfleet_core::types::{
    AdapterType, BotConnection, BotId, HealthStatus, JobId, JobRecord, JobStatus, NewJobRecord,
};
use botfleet_core::FleetError;

#[derive(Default)]
struct State {
    bots: Vec<BotConnection>,
    jobs: BTreeMap<i64, JobRecord>,
    next_job_id: i64,
}

/// A mock store for testing.
///
/// Writes can be made to fail with [`fail_writes`](Self::fail_writes) to
/// exercise storage error paths. Reads keep working.
pub struct MockStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl MockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_job_id: 1,
                ..State::default()
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with a storage error (or stop doing so).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored bot connections.
    pub async fn bot_count(&self) -> usize {
        self.state.lock().await.bots.len()
    }

    /// Every stored job, in submission order.
    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    fn check_writable(&self) -> Result<(), FleetError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FleetError::storage("injected write failure"));
        }
        Ok(())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, FleetError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FleetError> {
        Ok(())
    }
}

#[async_trait]
impl FleetStore for MockStore {
    async fn initialize(&self) -> Result<(), FleetError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), FleetError> {
        Ok(())
    }

    async fn load_all_bot_connections(&self) -> Result<Vec<BotConnection>, FleetError> {
        Ok(self.state.lock().await.bots.clone())
    }

    async fn save_bot_connection(&self, record: &BotConnection) -> Result<(), FleetError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        match state.bots.iter_mut().find(|b| b.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => state.bots.push(record.clone()),
        }
        Ok(())
    }

    async fn delete_bot_connection(&self, id: &BotId) -> Result<(), FleetError> {
        self.check_writable()?;
        self.state.lock().await.bots.retain(|b| &b.id != id);
        Ok(())
    }

    async fn enqueue_job_record(&self, job: &NewJobRecord) -> Result<JobRecord, FleetError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let id = state.next_job_id;
        state.next_job_id += 1;
        let now = Utc::now();
        let record = JobRecord {
            id: JobId(id),
            bot_id: job.bot_id.clone(),
            chat_id: job.chat_id.clone(),
            payload: job.payload.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            not_before: job.not_before,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, record.clone());
        Ok(record)
    }

    async fn load_due_job_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, FleetError> {
        let state = self.state.lock().await;
        let mut blocked = std::collections::HashSet::new();
        let mut due = Vec::new();
        for job in state.jobs.values() {
            if job.status.is_terminal() {
                continue;
            }
            let key = job.recipient_key();
            let first_unfinished = blocked.insert(key);
            if first_unfinished
                && job.status == JobStatus::Pending
                && job.not_before <= now
                && due.len() < limit
            {
                due.push(job.clone());
            }
        }
        Ok(due)
    }

    async fn update_job_record(&self, job: &JobRecord) -> Result<(), FleetError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let Some(stored) = state.jobs.get_mut(&job.id.0) else {
            return Err(FleetError::JobNotFound { id: job.id.0 });
        };
        stored.status = job.status;
        stored.attempts = job.attempts;
        stored.not_before = job.not_before;
        stored.last_error.clone_from(&job.last_error);
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn get_job_record(&self, id: JobId) -> Result<Option<JobRecord>, FleetError> {
        Ok(self.state.lock().await.jobs.get(&id.0).cloned())
    }

    async fn reset_in_flight_jobs(&self) -> Result<u64, FleetError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let mut n = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.updated_at = Utc::now();
                n += 1;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::types::{BotConfig, ChatId, Payload};

    fn new_job(chat: &str, not_before: DateTime<Utc>) -> NewJobRecord {
        NewJobRecord {
            bot_id: BotId::from("alpha"),
            chat_id: ChatId::from(chat),
            payload: Payload::text("hi"),
            max_attempts: 3,
            not_before,
        }
    }

    #[tokio::test]
    async fn save_keeps_registration_order() {
        let store = MockStore::new();
        let now = Utc::now();
        for id in ["b", "a", "c"] {
            let bot = BotConnection::from_config(BotConfig::new(id, id, "1:x"), now);
            store.save_bot_connection(&bot).await.unwrap();
        }
        let mut updated = BotConnection::from_config(BotConfig::new("a", "A2", "1:x"), now);
        updated.desired_enabled = true;
        store.save_bot_connection(&updated).await.unwrap();

        let ids: Vec<String> = store
            .load_all_bot_connections()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id.0)
            .collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn later_job_waits_for_older_same_recipient() {
        let store = MockStore::new();
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(60);
        store.enqueue_job_record(&new_job("1", later)).await.unwrap();
        let second = store.enqueue_job_record(&new_job("1", now)).await.unwrap();
        let other = store.enqueue_job_record(&new_job("2", now)).await.unwrap();

        let due = store.load_due_job_records(now, 10).await.unwrap();
        let ids: Vec<JobId> = due.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![other.id]);
        assert!(!ids.contains(&second.id));
    }

    #[tokio::test]
    async fn injected_failures_only_affect_writes() {
        let store = MockStore::new();
        store.fail_writes(true);
        assert!(store.enqueue_job_record(&new_job("1", Utc::now())).await.is_err());
        assert!(store.load_all_bot_connections().await.is_ok());
    }
}
