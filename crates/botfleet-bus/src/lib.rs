// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event bus for the Botfleet bot operator.
//!
//! The registry, monitor and dispatcher publish [`DomainEvent`]s here; the
//! log journal, bot statistics and [`LiveFeed`] consume them.

pub mod bus;
pub mod event;
pub mod feed;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use event::{DomainEvent, EventKind};
pub use feed::LiveFeed;
