// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared view of each bot's connectivity status.
//!
//! Only the lifecycle monitor writes here; everyone else reads.

use botfleet_core::{BotId, ConnectionStatus};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: DashMap<BotId, ConnectionStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &BotId) -> Option<ConnectionStatus> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Replace the status, returning the previous one.
    pub fn set(&self, id: &BotId, status: ConnectionStatus) -> Option<ConnectionStatus> {
        self.entries.insert(id.clone(), status)
    }

    pub fn remove(&self, id: &BotId) -> Option<ConnectionStatus> {
        self.entries.remove(id).map(|(_, status)| status)
    }
}
