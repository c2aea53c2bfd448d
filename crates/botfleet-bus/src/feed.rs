// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time fan-out of bus events to external clients.

use std::sync::Arc;

use botfleet_core::BoxError;
use tokio::sync::broadcast;
use tracing::trace;

use crate::bus::{EventBus, SubscriptionId};
use crate::event::DomainEvent;

/// Forwards every bus event, JSON-encoded, to a broadcast channel.
///
/// Events are only encoded while at least one client is subscribed.
/// Clients that fall behind by more than the channel capacity miss events.
/// Delivery to individual clients is not tracked.
#[derive(Clone)]
pub struct LiveFeed {
    sender: broadcast::Sender<Arc<str>>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe the feed to every event on `bus`.
    pub fn attach(&self, bus: &EventBus) -> SubscriptionId {
        let sender = self.sender.clone();
        bus.subscribe_all(move |event: &DomainEvent| -> Result<(), BoxError> {
            if sender.receiver_count() == 0 {
                trace!("live feed has no clients");
                return Ok(());
            }
            let json: Arc<str> = serde_json::to_string(event)?.into();
            // The last client may have gone since the check.
            let _ = sender.send(json);
            Ok(())
        })
    }

    /// A new client stream, starting with the next event.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
