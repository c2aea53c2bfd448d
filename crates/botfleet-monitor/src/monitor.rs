// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciles desired bot state with live transport sessions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};

use botfleet_bus::{DomainEvent, EventBus};
use botfleet_config::MonitorConfig;
use botfleet_core::{
    BotConnection, BotId, ConnectionStatus, FleetError, Session, SessionEvent, SessionLookup,
    TransportAdapter,
};
use botfleet_registry::{Registry, StatusBoard, TeardownRequest};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::{Link, LinkState};

/// A connectivity failure reported by a live session.
#[derive(Debug)]
struct Fault {
    bot_id: BotId,
    session_id: String,
    detail: String,
}

type FaultInbox = Arc<std::sync::Mutex<Vec<Fault>>>;

/// Owns every bot's transport session and connectivity status.
///
/// Each tick brings enabled bots online, takes disabled bots offline and
/// drops sessions of bots that left the registry. Ticks run on a fixed
/// interval, on [`reconcile_now`](Self::reconcile_now), and when a session
/// reports a fault. They never overlap.
pub struct LifecycleMonitor {
    registry: Arc<Registry>,
    transport: Arc<dyn TransportAdapter>,
    bus: Arc<EventBus>,
    config: MonitorConfig,
    statuses: Arc<StatusBoard>,
    // Held for the whole tick.
    links: Mutex<HashMap<BotId, Link>>,
    sessions: DashMap<BotId, Arc<dyn Session>>,
    faults: FaultInbox,
    wake: Arc<Notify>,
}

impl LifecycleMonitor {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn TransportAdapter>,
        bus: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        let statuses = registry.status_board();
        Self {
            registry,
            transport,
            bus,
            config,
            statuses,
            links: Mutex::new(HashMap::new()),
            sessions: DashMap::new(),
            faults: Arc::new(std::sync::Mutex::new(Vec::new())),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Run until `cancel` fires, then close every session.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut teardowns = self.registry.take_teardown_requests();
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.config.interval(), "lifecycle monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.tick().await,
                _ = self.wake.notified() => self.tick().await,
                Some(request) = next_teardown(&mut teardowns) => {
                    self.teardown(&request.bot_id).await;
                    // The requester may have timed out already.
                    let _ = request.done.send(());
                }
            }
        }

        self.shutdown().await;
        info!("lifecycle monitor stopped");
    }

    /// Request a tick as soon as possible, e.g. after enabling a bot.
    pub fn reconcile_now(&self) {
        self.wake.notify_one();
    }

    /// Current status of a bot, if the monitor has seen it.
    pub fn status(&self, id: &BotId) -> Option<ConnectionStatus> {
        self.statuses.get(id)
    }

    /// One reconciliation pass.
    pub async fn tick(&self) {
        let mut links = self.links.lock().await;

        let faulted = self.handle_faults(&mut links).await;

        let snapshot = self.registry.list();
        let known: HashSet<&BotId> = snapshot.iter().map(|b| &b.id).collect();
        let departed: Vec<BotId> = links
            .keys()
            .filter(|id| !known.contains(id))
            .cloned()
            .collect();
        for id in departed {
            if let Some(mut link) = links.remove(&id) {
                debug!(bot_id = %id, "bot left the registry, dropping session");
                self.close_link(&id, &mut link).await;
            }
            self.statuses.remove(&id);
        }

        let mut to_open: Vec<BotConnection> = Vec::new();
        for bot in snapshot.iter() {
            let link = links
                .entry(bot.id.clone())
                .or_insert_with(|| Link::new(&bot.name));
            link.name.clone_from(&bot.name);

            if bot.desired_enabled {
                if link.session.is_none() && !faulted.contains(&bot.id) {
                    self.transition(&bot.id, link, LinkState::Connecting, None);
                    to_open.push(bot.clone());
                }
            } else if link.session.is_some() || link.state != LinkState::Offline {
                self.close_link(&bot.id, link).await;
                self.transition(&bot.id, link, LinkState::Offline, None);
                info!(bot_id = %bot.id, "bot disabled, session closed");
            }
        }

        let timeout = self.config.connect_timeout();
        let attempts = join_all(to_open.iter().map(|bot| async move {
            match tokio::time::timeout(timeout, self.transport.open_session(bot)).await {
                Ok(result) => result,
                Err(_) => Err(FleetError::Timeout { duration: timeout }),
            }
        }))
        .await;

        for (bot, attempt) in to_open.iter().zip(attempts) {
            let Some(link) = links.get_mut(&bot.id) else {
                continue;
            };
            match attempt {
                Ok(session) => {
                    link.pump = self.spawn_pump(&session);
                    self.sessions.insert(bot.id.clone(), Arc::clone(&session));
                    link.session = Some(session);
                    self.transition(&bot.id, link, LinkState::Online, None);
                    info!(bot_id = %bot.id, "bot online");
                }
                Err(e) => {
                    warn!(bot_id = %bot.id, error = %e, "failed to open session");
                    self.transition(&bot.id, link, LinkState::Error, Some(e.to_string()));
                }
            }
        }
    }

    /// Close a bot's session right away and forget it.
    pub async fn teardown(&self, id: &BotId) {
        let mut links = self.links.lock().await;
        if let Some(mut link) = links.remove(id) {
            self.close_link(id, &mut link).await;
            self.transition(id, &mut link, LinkState::Offline, None);
        }
        self.statuses.remove(id);
        debug!(bot_id = %id, "session torn down");
    }

    /// Close every session, announcing bots that go offline.
    pub async fn shutdown(&self) {
        let mut links = self.links.lock().await;
        for (id, link) in links.iter_mut() {
            self.close_link(id, link).await;
            self.transition(id, link, LinkState::Offline, None);
        }
        links.clear();
    }

    async fn handle_faults(&self, links: &mut HashMap<BotId, Link>) -> HashSet<BotId> {
        let faults = std::mem::take(
            &mut *self
                .faults
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut faulted = HashSet::new();
        for fault in faults {
            let Some(link) = links.get_mut(&fault.bot_id) else {
                continue;
            };
            if !link.owns(&fault.session_id) {
                debug!(bot_id = %fault.bot_id, "ignoring fault from a replaced session");
                continue;
            }
            warn!(bot_id = %fault.bot_id, detail = %fault.detail, "session fault");
            self.close_link(&fault.bot_id, link).await;
            self.transition(&fault.bot_id, link, LinkState::Error, Some(fault.detail));
            faulted.insert(fault.bot_id);
        }
        faulted
    }

    fn transition(&self, id: &BotId, link: &mut Link, to: LinkState, detail: Option<String>) {
        let from = link.state;
        link.state = to;
        let Some(kind) = to.visible() else {
            return;
        };
        let now = Utc::now();
        let status = ConnectionStatus {
            kind,
            since: now,
            detail: detail.clone(),
        };
        let previous = self
            .statuses
            .set(id, status)
            .map(|s| s.kind)
            .unwrap_or(botfleet_core::StatusKind::Offline);

        if to.announces(from) {
            self.bus.publish(DomainEvent::BotStatusChanged {
                at: now,
                bot_id: id.clone(),
                bot_name: link.name.clone(),
                previous,
                status: kind,
                detail,
            });
        }
    }

    async fn close_link(&self, id: &BotId, link: &mut Link) {
        if let Some(pump) = link.pump.take() {
            pump.abort();
        }
        self.sessions.remove(id);
        if let Some(session) = link.session.take() {
            if let Err(e) = self.transport.close_session(session).await {
                warn!(bot_id = %id, error = %e, "error closing session");
            }
        }
    }

    fn spawn_pump(&self, session: &Arc<dyn Session>) -> Option<JoinHandle<()>> {
        let mut events = session.take_events()?;
        let bus = Arc::clone(&self.bus);
        let faults = Arc::clone(&self.faults);
        let wake = Arc::clone(&self.wake);
        let bot_id = session.bot_id().clone();
        let session_id = session.session_id().to_string();

        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Inbound(message) => {
                        bus.publish(DomainEvent::MessageReceived {
                            at: Utc::now(),
                            message,
                        });
                    }
                    SessionEvent::Fault(detail) => {
                        faults
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(Fault {
                                bot_id,
                                session_id,
                                detail,
                            });
                        wake.notify_one();
                        return;
                    }
                }
            }
        }))
    }
}

impl SessionLookup for LifecycleMonitor {
    fn session(&self, bot_id: &BotId) -> Option<Arc<dyn Session>> {
        self.sessions.get(bot_id).map(|s| Arc::clone(s.value()))
    }
}

async fn next_teardown(
    rx: &mut Option<mpsc::UnboundedReceiver<TeardownRequest>>,
) -> Option<TeardownRequest> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
