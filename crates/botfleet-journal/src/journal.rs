// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-memory log of fleet activity, newest entry first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use botfleet_bus::{DomainEvent, EventBus, SubscriptionId};
use botfleet_config::JournalConfig;
use botfleet_core::{BoxError, StatusKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Component or bot the entry is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Operator log journal.
///
/// Keeps at most `max_entries`; the oldest entries are dropped first.
pub struct LogJournal {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl LogJournal {
    pub fn new(config: &JournalConfig) -> Self {
        Self::with_capacity(config.max_entries)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Subscribe the journal to every event on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let journal = Arc::clone(self);
        bus.subscribe_all(move |event: &DomainEvent| -> Result<(), BoxError> {
            journal.push(entry_for(event));
            Ok(())
        })
    }

    /// Add an entry stamped with the current time.
    pub fn record(
        &self,
        level: LogLevel,
        source: Option<&str>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        self.push(LogEntry {
            timestamp: Utc::now(),
            level,
            source: source.map(str::to_string),
            message: message.into(),
            details,
        });
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.guard().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn push(&self, entry: LogEntry) {
        let mut entries = self.guard();
        entries.push_front(entry);
        entries.truncate(self.max_entries);
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn entry_for(event: &DomainEvent) -> LogEntry {
    let (level, message, details) = match event {
        DomainEvent::BotStatusChanged {
            bot_name,
            previous,
            status,
            detail,
            ..
        } => {
            let level = match status {
                StatusKind::Error => LogLevel::Error,
                StatusKind::Offline => LogLevel::Warn,
                StatusKind::Online => LogLevel::Info,
            };
            let message = match detail {
                Some(detail) => format!("{bot_name} is {status} ({detail})"),
                None => format!("{bot_name} is {status}"),
            };
            (level, message, Some(json!({ "previous": previous, "status": status })))
        }
        DomainEvent::MessageSent {
            job_id,
            chat_id,
            attempts,
            message_id,
            ..
        } => (
            LogLevel::Info,
            format!("message {job_id} sent to {chat_id}"),
            Some(json!({ "attempts": attempts, "message_id": message_id })),
        ),
        DomainEvent::MessageFailed {
            job_id,
            chat_id,
            attempts,
            error,
            ..
        } => (
            LogLevel::Error,
            format!("message {job_id} to {chat_id} failed: {error}"),
            Some(json!({ "attempts": attempts })),
        ),
        DomainEvent::MessageReceived { message, .. } => (
            LogLevel::Info,
            format!("message received from {}", message.chat_id),
            message.text.as_ref().map(|text| json!({ "text": text })),
        ),
    };
    LogEntry {
        timestamp: event.timestamp(),
        level,
        source: Some(event.bot_id().to_string()),
        message,
        details,
    }
}
