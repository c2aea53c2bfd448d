// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous publish/subscribe with per-handler fault isolation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use botfleet_core::BoxError;
use tracing::{debug, error, warn};

use crate::event::{DomainEvent, EventKind};

/// Something that reacts to published events.
///
/// Implemented for any `Fn(&DomainEvent) -> Result<(), BoxError>`.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &DomainEvent) -> Result<(), BoxError>;
}

impl<F> EventHandler for F
where
    F: Fn(&DomainEvent) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn handle(&self, event: &DomainEvent) -> Result<(), BoxError> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    filter: Option<EventKind>,
    handler: Arc<dyn EventHandler>,
}

/// In-process event bus.
///
/// `publish` calls every matching handler inline, in subscription order.
/// A handler that returns an error or panics is logged and skipped; the
/// remaining handlers still run and the publisher never sees the failure.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to one kind of event.
    pub fn subscribe(&self, kind: EventKind, handler: impl EventHandler) -> SubscriptionId {
        self.add(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self, handler: impl EventHandler) -> SubscriptionId {
        self.add(None, Arc::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every matching handler.
    pub fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        // Handlers run outside the lock so they may (un)subscribe themselves.
        let targets: Vec<Subscription> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.filter.is_none_or(|k| k == kind))
            .cloned()
            .collect();

        debug!(event = %kind, handlers = targets.len(), "publishing event");

        for sub in targets {
            match catch_unwind(AssertUnwindSafe(|| sub.handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = %kind, subscription = sub.id.0, error = %e, "event handler failed");
                }
                Err(_) => {
                    error!(event = %kind, subscription = sub.id.0, "event handler panicked");
                }
            }
        }
    }

    fn add(&self, filter: Option<EventKind>, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                filter,
                handler,
            });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
