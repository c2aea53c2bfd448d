// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle monitor: opens, watches and closes transport sessions so each
//! bot's live state follows its operator intent.

pub mod link;
pub mod monitor;

pub use link::LinkState;
pub use monitor::LifecycleMonitor;
