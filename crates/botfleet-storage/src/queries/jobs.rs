// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound job queue.
//!
//! Rows are never deleted: terminal jobs keep their final status so callers
//! can look up outcomes.

use botfleet_core::{
    BotId, ChatId, FleetError, JobId, JobRecord, JobStatus, NewJobRecord, Payload,
    types::recipient_key,
};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use super::{from_millis, parse_text, to_millis};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, bot_id, chat_id, payload_kind, payload_body, payload_caption, \
                       status, attempts, max_attempts, not_before, last_error, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind: String = row.get(3)?;
    let status: String = row.get(6)?;
    Ok(JobRecord {
        id: JobId(row.get(0)?),
        bot_id: BotId(row.get(1)?),
        chat_id: ChatId(row.get(2)?),
        payload: Payload {
            kind: parse_text(3, &kind)?,
            body: row.get(4)?,
            caption: row.get(5)?,
        },
        status: parse_text(6, &status)?,
        attempts: row.get(7)?,
        max_attempts: row.get(8)?,
        not_before: from_millis(9, row.get(9)?)?,
        last_error: row.get(10)?,
        created_at: from_millis(11, row.get(11)?)?,
        updated_at: from_millis(12, row.get(12)?)?,
    })
}

/// Insert a pending job with zero attempts and return the stored row.
pub async fn enqueue(db: &Database, job: &NewJobRecord) -> Result<JobRecord, FleetError> {
    let job = job.clone();
    let now = Utc::now();
    db.connection()
        .call(move |conn| -> Result<JobRecord, rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (bot_id, chat_id, recipient_key, payload_kind, payload_body,
                                   payload_caption, status, attempts, max_attempts, not_before,
                                   created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?9, ?9)",
                params![
                    job.bot_id.0,
                    job.chat_id.0,
                    recipient_key(&job.bot_id, &job.chat_id),
                    job.payload.kind.to_string(),
                    job.payload.body,
                    job.payload.caption,
                    job.max_attempts,
                    to_millis(job.not_before),
                    to_millis(now),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Pending jobs due at `now`, oldest first.
///
/// A job is skipped while an older job for the same bot and chat is still
/// pending or processing, which keeps per-recipient delivery in order even
/// when the older job is waiting out a retry delay.
pub async fn load_due(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<JobRecord>, FleetError> {
    let now = to_millis(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<JobRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM jobs AS j
                 WHERE j.status = 'pending'
                   AND j.not_before <= ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM jobs AS e
                       WHERE e.recipient_key = j.recipient_key
                         AND e.id < j.id
                         AND e.status IN ('pending', 'processing')
                   )
                 ORDER BY j.id
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now, limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Write back the mutable fields of a job.
pub async fn update(db: &Database, job: &JobRecord) -> Result<(), FleetError> {
    let id = job.id;
    let status = job.status.to_string();
    let attempts = job.attempts;
    let not_before = to_millis(job.not_before);
    let last_error = job.last_error.clone();
    let updated_at = to_millis(job.updated_at);
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = ?1, attempts = ?2, not_before = ?3,
                                 last_error = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![status, attempts, not_before, last_error, updated_at, id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(FleetError::JobNotFound { id: id.0 });
    }
    Ok(())
}

pub async fn get(db: &Database, id: JobId) -> Result<Option<JobRecord>, FleetError> {
    db.connection()
        .call(move |conn| -> Result<Option<JobRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id.0], from_row)?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Return jobs left `processing` by an interrupted run to `pending`.
pub async fn reset_in_flight(db: &Database) -> Result<u64, FleetError> {
    let now = to_millis(Utc::now());
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let n = conn.execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE status = 'processing'",
                params![JobStatus::Pending.to_string(), now],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_job(bot: &str, chat: &str, text: &str, not_before: DateTime<Utc>) -> NewJobRecord {
        NewJobRecord {
            bot_id: BotId::from(bot),
            chat_id: ChatId::from(chat),
            payload: Payload::text(text),
            max_attempts: 3,
            not_before,
        }
    }

    #[tokio::test]
    async fn enqueue_returns_pending_row() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let job = enqueue(&db, &new_job("alpha", "42", "hi", now)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.payload.body, "hi");
        assert_eq!(get(&db, job.id).await.unwrap(), Some(job));
    }

    #[tokio::test]
    async fn ids_increase_in_submission_order() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let a = enqueue(&db, &new_job("alpha", "1", "a", now)).await.unwrap();
        let b = enqueue(&db, &new_job("alpha", "2", "b", now)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn future_jobs_are_not_due() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        enqueue(&db, &new_job("alpha", "1", "later", now + Duration::seconds(60)))
            .await
            .unwrap();
        assert!(load_due(&db, now, 10).await.unwrap().is_empty());
        assert_eq!(load_due(&db, now + Duration::seconds(61), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn older_job_for_same_recipient_blocks_newer() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let mut first = enqueue(&db, &new_job("alpha", "42", "first", now)).await.unwrap();
        let second = enqueue(&db, &new_job("alpha", "42", "second", now)).await.unwrap();
        let other = enqueue(&db, &new_job("alpha", "7", "other", now)).await.unwrap();

        let due: Vec<JobId> = load_due(&db, now, 10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(due, vec![first.id, other.id]);

        // A retry delay on the older job still holds the newer one back.
        first.attempts = 1;
        first.not_before = now + Duration::seconds(30);
        update(&db, &first).await.unwrap();
        let due: Vec<JobId> = load_due(&db, now, 10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(due, vec![other.id]);

        first.status = JobStatus::Sent;
        update(&db, &first).await.unwrap();
        let due: Vec<JobId> = load_due(&db, now, 10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(due, vec![second.id, other.id]);
    }

    #[tokio::test]
    async fn limit_caps_the_batch() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        for chat in 0..5 {
            enqueue(&db, &new_job("alpha", &chat.to_string(), "x", now)).await.unwrap();
        }
        assert_eq!(load_due(&db, now, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_in_flight_returns_processing_jobs_to_pending() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let mut job = enqueue(&db, &new_job("alpha", "42", "x", now)).await.unwrap();
        job.status = JobStatus::Processing;
        update(&db, &job).await.unwrap();
        assert!(load_due(&db, now, 10).await.unwrap().is_empty());

        assert_eq!(reset_in_flight(&db).await.unwrap(), 1);
        assert_eq!(load_due(&db, now, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updating_missing_job_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let job = enqueue(&db, &new_job("alpha", "42", "x", Utc::now())).await.unwrap();
        let ghost = JobRecord { id: JobId(999), ..job };
        assert!(matches!(
            update(&db, &ghost).await,
            Err(FleetError::JobNotFound { id: 999 })
        ));
    }
}
