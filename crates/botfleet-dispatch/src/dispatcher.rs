// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable outbound queue with a fixed pool of delivery workers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use botfleet_bus::{DomainEvent, EventBus};
use botfleet_config::DispatchConfig;
use botfleet_core::{
    DeliveryAck, FleetError, FleetStore, JobId, JobRecord, JobStatus, NewJobRecord, OutboundJob,
    SessionLookup, TransportAdapter,
};
use botfleet_registry::Registry;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::RetryPolicy;

const OUTCOME_RETRY_BASE: Duration = Duration::from_millis(50);
const OUTCOME_RETRY_MAX: Duration = Duration::from_secs(5);

/// Accepts send requests and delivers them in the background.
///
/// Jobs are stored before `enqueue` returns. A scheduler claims due jobs
/// and hands each to the worker chosen by hashing its bot and chat, so
/// one recipient's messages always go through the same worker. A job is
/// never claimed while an older job for the same recipient is unfinished.
/// Retry delays are stored on the job; no worker sleeps through them.
pub struct Dispatcher {
    registry: Arc<Registry>,
    sessions: Arc<dyn SessionLookup>,
    transport: Arc<dyn TransportAdapter>,
    store: Arc<dyn FleetStore>,
    bus: Arc<EventBus>,
    config: DispatchConfig,
    policy: RetryPolicy,
    wake: Notify,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<dyn SessionLookup>,
        transport: Arc<dyn TransportAdapter>,
        store: Arc<dyn FleetStore>,
        bus: Arc<EventBus>,
        config: DispatchConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            registry,
            sessions,
            transport,
            store,
            bus,
            config,
            policy,
            wake: Notify::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Store a job for delivery and return its id without waiting.
    pub async fn enqueue(&self, job: OutboundJob) -> Result<JobId, FleetError> {
        if !self.registry.contains(&job.bot_id) {
            return Err(FleetError::UnknownBot {
                id: job.bot_id.0.clone(),
            });
        }
        if job.chat_id.as_str().trim().is_empty() {
            return Err(FleetError::InvalidInput("chat id must not be empty".into()));
        }
        if job.payload.body.trim().is_empty() {
            return Err(FleetError::InvalidInput(format!(
                "{} payload must not be empty",
                job.payload.kind
            )));
        }

        let record = self
            .store
            .enqueue_job_record(&NewJobRecord {
                bot_id: job.bot_id,
                chat_id: job.chat_id,
                payload: job.payload,
                max_attempts: self.policy.max_attempts,
                not_before: job.not_before.unwrap_or_else(Utc::now),
            })
            .await?;

        debug!(job_id = %record.id, bot_id = %record.bot_id, chat_id = %record.chat_id, "job enqueued");
        self.wake.notify_one();
        Ok(record.id)
    }

    /// Enqueue several jobs. Each gets its own outcome, in input order.
    pub async fn enqueue_bulk(&self, jobs: Vec<OutboundJob>) -> Vec<Result<JobId, FleetError>> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.enqueue(job).await);
        }
        results
    }

    pub async fn get_job(&self, id: JobId) -> Result<JobRecord, FleetError> {
        self.store
            .get_job_record(id)
            .await?
            .ok_or(FleetError::JobNotFound { id: id.0 })
    }

    /// Run the scheduler and workers until `cancel` fires.
    ///
    /// Jobs left in flight by an earlier run are made pending again first.
    /// Jobs claimed but not started at shutdown are recovered the same way
    /// on the next run.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        match self.store.reset_in_flight_jobs().await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "recovered in-flight jobs"),
            Err(e) => warn!(error = %e, "failed to recover in-flight jobs"),
        }

        let worker_count = self.config.workers.max(1);
        let mut queues = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::channel(self.config.batch_size.max(1));
            queues.push(tx);
            handles.push(tokio::spawn(Arc::clone(&self).worker(index, rx, cancel.clone())));
        }

        info!(workers = worker_count, "dispatcher started");

        loop {
            let claimed = self.schedule(&queues).await;
            if cancel.is_cancelled() {
                break;
            }
            if claimed >= self.config.batch_size {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        drop(queues);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatch worker panicked");
            }
        }
        info!("dispatcher stopped");
    }

    /// Claim due jobs and route them to workers. Returns how many were claimed.
    ///
    /// A job whose worker queue is full stays pending for a later pass, so a
    /// busy worker never holds up the others.
    async fn schedule(&self, queues: &[mpsc::Sender<JobRecord>]) -> usize {
        let now = Utc::now();
        let due = match self
            .store
            .load_due_job_records(now, self.config.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to load due jobs");
                return 0;
            }
        };

        let mut claimed = 0;
        for mut job in due {
            let worker = route(&job.recipient_key(), queues.len());
            let permit = match queues[worker].try_reserve() {
                Ok(permit) => permit,
                Err(mpsc::error::TrySendError::Full(())) => {
                    debug!(job_id = %job.id, worker, "worker queue full, job left pending");
                    continue;
                }
                // Worker gone: shutting down.
                Err(mpsc::error::TrySendError::Closed(())) => break,
            };
            job.status = JobStatus::Processing;
            job.updated_at = now;
            if let Err(e) = self.store.update_job_record(&job).await {
                warn!(job_id = %job.id, error = %e, "failed to claim job");
                continue;
            }
            permit.send(job);
            claimed += 1;
        }
        claimed
    }

    async fn worker(
        self: Arc<Self>,
        index: usize,
        mut queue: mpsc::Receiver<JobRecord>,
        cancel: CancellationToken,
    ) {
        debug!(worker = index, "dispatch worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = queue.recv() => job,
            };
            let Some(job) = job else {
                break;
            };
            let outcome = self.attempt(&job).await;
            self.settle(job, outcome, &cancel).await;
        }
        debug!(worker = index, "dispatch worker stopped");
    }

    /// One delivery attempt.
    async fn attempt(&self, job: &JobRecord) -> Result<DeliveryAck, FleetError> {
        if !self.registry.contains(&job.bot_id) {
            return Err(FleetError::UnknownBot {
                id: job.bot_id.0.clone(),
            });
        }
        let Some(session) = self.sessions.session(&job.bot_id) else {
            return Err(FleetError::transient("no live session"));
        };
        let timeout = self.config.send_timeout();
        match tokio::time::timeout(
            timeout,
            self.transport
                .send(session.as_ref(), &job.chat_id, &job.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FleetError::Timeout { duration: timeout }),
        }
    }

    /// Record the outcome of an attempt and publish terminal results.
    ///
    /// Terminal events are published only once the outcome is stored.
    async fn settle(
        &self,
        mut job: JobRecord,
        outcome: Result<DeliveryAck, FleetError>,
        cancel: &CancellationToken,
    ) {
        let now = Utc::now();
        job.attempts += 1;
        job.updated_at = now;

        match outcome {
            Ok(ack) => {
                job.status = JobStatus::Sent;
                job.last_error = None;
                if !self.persist(&job, cancel).await {
                    return;
                }
                info!(job_id = %job.id, bot_id = %job.bot_id, chat_id = %job.chat_id, attempt = job.attempts, "message sent");
                self.bus.publish(DomainEvent::MessageSent {
                    at: now,
                    job_id: job.id,
                    bot_id: job.bot_id,
                    chat_id: job.chat_id,
                    attempts: job.attempts,
                    message_id: ack.message_id,
                });
            }
            // The limit stored with the job governs, not the current policy.
            Err(e) if e.is_retryable() && job.attempts < job.max_attempts => {
                let delay = self.policy.delay(job.attempts, e.retry_after());
                job.status = JobStatus::Pending;
                job.not_before = after(now, delay);
                job.last_error = Some(e.to_string());
                if !self.persist(&job, cancel).await {
                    return;
                }
                warn!(
                    job_id = %job.id,
                    bot_id = %job.bot_id,
                    attempt = job.attempts,
                    retry_in = ?delay,
                    error = %e,
                    "delivery failed, will retry"
                );
            }
            Err(e) => {
                let message = e.to_string();
                job.status = JobStatus::Failed;
                job.last_error = Some(message.clone());
                if !self.persist(&job, cancel).await {
                    return;
                }
                warn!(job_id = %job.id, bot_id = %job.bot_id, attempt = job.attempts, error = %e, "delivery failed permanently");
                self.bus.publish(DomainEvent::MessageFailed {
                    at: now,
                    job_id: job.id,
                    bot_id: job.bot_id,
                    chat_id: job.chat_id,
                    attempts: job.attempts,
                    error: message,
                });
            }
        }

        // A settled job may unblock the next one for the same recipient.
        self.wake.notify_one();
    }

    /// Store an attempt's outcome, retrying the write until it succeeds.
    ///
    /// Returns false if cancelled first. The row then stays `processing`
    /// and is made pending again on the next run.
    async fn persist(&self, job: &JobRecord, cancel: &CancellationToken) -> bool {
        let mut delay = OUTCOME_RETRY_BASE;
        loop {
            match self.store.update_job_record(job).await {
                Ok(()) => return true,
                Err(e) => {
                    error!(job_id = %job.id, status = %job.status, retry_in = ?delay, error = %e, "failed to record job outcome");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(job_id = %job.id, "outcome not recorded before shutdown");
                    return false;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(OUTCOME_RETRY_MAX);
        }
    }
}

/// Worker index for a recipient key.
pub fn route(recipient_key: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    recipient_key.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_is_stable_and_in_range() {
        for workers in 1..8 {
            let a = route("alpha:42", workers);
            assert!(a < workers);
            assert_eq!(a, route("alpha:42", workers));
        }
    }

    #[test]
    fn route_tolerates_zero_workers() {
        assert_eq!(route("alpha:42", 0), 0);
    }

    #[test]
    fn after_saturates_on_overflow() {
        let now = Utc::now();
        assert_eq!(after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert!(after(now, Duration::from_secs(2)) > now);
    }
}
