// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records published events so tests can assert on them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use botfleet_bus::{DomainEvent, EventBus, EventKind};
use botfleet_core::BoxError;
use tokio::sync::Notify;

/// Bus subscriber keeping every event it sees, in publish order.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<DomainEvent>>,
    notify: Notify,
}

impl EventRecorder {
    /// Create a recorder subscribed to every event on `bus`.
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        let sink = Arc::clone(&recorder);
        bus.subscribe_all(move |event: &DomainEvent| -> Result<(), BoxError> {
            sink.guard().push(event.clone());
            sink.notify.notify_waiters();
            Ok(())
        });
        recorder
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.guard().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<DomainEvent> {
        self.guard()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.guard().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Wait until the recorded events satisfy `done`. Returns `false` on timeout.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        mut done: impl FnMut(&[DomainEvent]) -> bool,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if done(&self.guard()) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return done(&self.guard());
            }
        }
    }

    /// Wait until at least `n` events of `kind` were recorded.
    pub async fn wait_for_count(&self, kind: EventKind, n: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |events| {
            events.iter().filter(|e| e.kind() == kind).count() >= n
        })
        .await
    }

    fn guard(&self) -> MutexGuard<'_, Vec<DomainEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
