// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bot activity counters.
//!
//! Counters live in memory only and start from zero on every run.

use std::sync::Arc;

use botfleet_bus::{DomainEvent, EventBus, SubscriptionId};
use botfleet_core::{BotId, BoxError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BotCounters {
    pub sent: u64,
    pub failed: u64,
    pub received: u64,
    pub status_changes: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Running totals per bot, fed by the event bus.
#[derive(Default)]
pub struct BotStats {
    counters: DashMap<BotId, BotCounters>,
}

impl BotStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let stats = Arc::clone(self);
        bus.subscribe_all(move |event: &DomainEvent| -> Result<(), BoxError> {
            stats.observe(event);
            Ok(())
        })
    }

    pub fn observe(&self, event: &DomainEvent) {
        let mut counters = self.counters.entry(event.bot_id().clone()).or_default();
        match event {
            DomainEvent::BotStatusChanged { .. } => counters.status_changes += 1,
            DomainEvent::MessageSent { .. } => counters.sent += 1,
            DomainEvent::MessageFailed { .. } => counters.failed += 1,
            DomainEvent::MessageReceived { .. } => counters.received += 1,
        }
        let at = event.timestamp();
        if counters.last_activity.is_none_or(|last| last < at) {
            counters.last_activity = Some(at);
        }
    }

    /// Counters for one bot; zero if it has had no activity.
    pub fn get(&self, id: &BotId) -> BotCounters {
        self.counters
            .get(id)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    /// Counters for every bot with activity, sorted by bot id.
    pub fn all(&self) -> Vec<(BotId, BotCounters)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop a bot's counters, e.g. after it was deregistered.
    pub fn forget(&self, id: &BotId) {
        self.counters.remove(id);
    }
}
