// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport collaborator: the narrow slice of a messaging platform client
//! that the monitor and dispatcher depend on.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::FleetError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BotConnection, BotId, ChatId, DeliveryAck, Payload, SessionEvent};

/// A live connection to the messaging platform for one bot.
pub trait Session: Send + Sync + 'static {
    fn bot_id(&self) -> &BotId;

    /// Unique per opened session; used to discard reports from stale sessions.
    fn session_id(&self) -> &str;

    /// Hands out the stream of inbound messages and faults. Returns `Some`
    /// at most once per session.
    fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>>;

    /// Lets a transport recover its concrete session type.
    fn as_any(&self) -> &dyn Any;
}

/// Adapter for a messaging platform.
#[async_trait]
pub trait TransportAdapter: PluginAdapter {
    /// Opens a session with the bot's credential.
    ///
    /// Fails with [`FleetError::Connection`] when the platform rejects the
    /// credential or cannot be reached.
    async fn open_session(&self, bot: &BotConnection) -> Result<Arc<dyn Session>, FleetError>;

    /// Closes a session. Closing twice is harmless.
    async fn close_session(&self, session: Arc<dyn Session>) -> Result<(), FleetError>;

    /// Delivers one payload.
    ///
    /// Fails with [`FleetError::Transient`] for retryable problems and
    /// [`FleetError::Permanent`] for ones retrying cannot fix.
    async fn send(
        &self,
        session: &dyn Session,
        chat_id: &ChatId,
        payload: &Payload,
    ) -> Result<DeliveryAck, FleetError>;
}

/// Read access to the live sessions owned by the lifecycle monitor.
pub trait SessionLookup: Send + Sync + 'static {
    fn session(&self, bot_id: &BotId) -> Option<Arc<dyn Session>>;
}

/// A lookup with no live sessions, for processes that only enqueue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessions;

impl SessionLookup for NoSessions {
    fn session(&self, _bot_id: &BotId) -> Option<Arc<dyn Session>> {
        None
    }
}
