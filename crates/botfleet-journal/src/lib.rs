// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator-facing views fed by the event bus: a bounded log journal and
//! per-bot activity counters.

pub mod journal;
pub mod stats;

pub use journal::{LogEntry, LogJournal, LogLevel};
pub use stats::{BotCounters, BotStats};
