// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport adapter for deterministic testing.
//!
//! `MockTransport` opens in-memory sessions, captures every send attempt
//! and replays scripted outcomes per chat so retry paths can be driven
//! without a network.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use botfleet_core::traits::adapter::PluginAdapter;
use botfleet_core::traits::transport::{Session, TransportAdapter};
use botfleet_core::types::{
    AdapterType, BotConnection, BotId, ChatId, DeliveryAck, HealthStatus, InboundMessage,
    Payload, PayloadKind, SessionEvent,
};
use botfleet_core::FleetError;

/// Outcome of one scripted send attempt.
#[derive(Debug, Clone)]
pub enum SendScript {
    Ack,
    Transient(String),
    /// Transient failure carrying a platform retry hint.
    RetryAfter(Duration),
    Permanent(String),
    /// Sleep before acknowledging, to trip send timeouts.
    Delay(Duration),
}

/// A message the transport accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub bot_id: BotId,
    pub chat_id: ChatId,
    pub payload: Payload,
    pub message_id: String,
}

/// An in-memory session handed out by [`MockTransport`].
pub struct MockSession {
    bot_id: BotId,
    session_id: String,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    closed: AtomicBool,
}

impl MockSession {
    fn new(bot_id: BotId) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            bot_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Session for MockSession {
    fn bot_id(&self) -> &BotId {
        &self.bot_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        lock(&self.events_rx).take()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct State {
    refused: HashSet<String>,
    open_delay: Option<Duration>,
    live: HashMap<BotId, Arc<MockSession>>,
    opens: HashMap<BotId, usize>,
    closes: HashMap<BotId, usize>,
    scripts: HashMap<ChatId, VecDeque<SendScript>>,
    attempts: Vec<(BotId, ChatId, Payload)>,
    sent: Vec<SentMessage>,
}

/// A mock messaging platform for testing.
///
/// Tokens are accepted unless refused with [`refuse_token`](Self::refuse_token).
/// Sends succeed unless a chat has scripted outcomes queued with
/// [`script`](Self::script); each attempt consumes one entry.
pub struct MockTransport {
    state: Mutex<State>,
    next_message_id: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Reject session opens for this token.
    pub fn refuse_token(&self, token: &str) {
        lock(&self.state).refused.insert(token.to_string());
    }

    /// Accept this token again.
    pub fn accept_token(&self, token: &str) {
        lock(&self.state).refused.remove(token);
    }

    /// Delay every session open, to trip connect timeouts.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        lock(&self.state).open_delay = delay;
    }

    /// Queue outcomes for the next send attempts to `chat_id`.
    pub fn script(&self, chat_id: &str, outcomes: impl IntoIterator<Item = SendScript>) {
        lock(&self.state)
            .scripts
            .entry(ChatId::from(chat_id))
            .or_default()
            .extend(outcomes);
    }

    /// Whether the bot currently has an open session.
    pub fn is_live(&self, bot_id: &str) -> bool {
        lock(&self.state).live.contains_key(&BotId::from(bot_id))
    }

    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    pub fn open_count(&self, bot_id: &str) -> usize {
        lock(&self.state)
            .opens
            .get(&BotId::from(bot_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn close_count(&self, bot_id: &str) -> usize {
        lock(&self.state)
            .closes
            .get(&BotId::from(bot_id))
            .copied()
            .unwrap_or(0)
    }

    /// Messages the transport accepted, in acceptance order.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.state).sent.clone()
    }

    /// Texts accepted for one chat, in acceptance order.
    pub fn sent_texts(&self, chat_id: &str) -> Vec<String> {
        lock(&self.state)
            .sent
            .iter()
            .filter(|m| m.chat_id.as_str() == chat_id)
            .map(|m| m.payload.body.clone())
            .collect()
    }

    /// Texts of every send attempt to one chat, successful or not, in order.
    pub fn attempt_texts(&self, chat_id: &str) -> Vec<String> {
        lock(&self.state)
            .attempts
            .iter()
            .filter(|(_, chat, _)| chat.as_str() == chat_id)
            .map(|(_, _, payload)| payload.body.clone())
            .collect()
    }

    /// Number of send attempts made to one chat, successful or not.
    pub fn attempt_count(&self, chat_id: &str) -> usize {
        lock(&self.state)
            .attempts
            .iter()
            .filter(|(_, chat, _)| chat.as_str() == chat_id)
            .count()
    }

    /// Deliver an inbound text through the bot's live session.
    /// Returns `false` if the bot has no session.
    pub fn inject_inbound(&self, bot_id: &str, chat_id: &str, text: &str) -> bool {
        let Some(session) = self.live_session(bot_id) else {
            return false;
        };
        let message = InboundMessage {
            bot_id: session.bot_id.clone(),
            chat_id: ChatId::from(chat_id),
            message_id: self.next_message_id(),
            kind: PayloadKind::Text,
            text: Some(text.to_string()),
            received_at: Utc::now(),
        };
        session
            .events_tx
            .try_send(SessionEvent::Inbound(message))
            .is_ok()
    }

    /// Report a connectivity fault from the bot's live session.
    /// Returns `false` if the bot has no session.
    pub fn inject_fault(&self, bot_id: &str, detail: &str) -> bool {
        let Some(session) = self.live_session(bot_id) else {
            return false;
        };
        session
            .events_tx
            .try_send(SessionEvent::Fault(detail.to_string()))
            .is_ok()
    }

    fn live_session(&self, bot_id: &str) -> Option<Arc<MockSession>> {
        lock(&self.state).live.get(&BotId::from(bot_id)).cloned()
    }

    fn next_message_id(&self) -> String {
        self.next_message_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, FleetError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FleetError> {
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn open_session(&self, bot: &BotConnection) -> Result<Arc<dyn Session>, FleetError> {
        let delay = lock(&self.state).open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.opens.entry(bot.id.clone()).or_default() += 1;
        if state.refused.contains(&bot.token) {
            return Err(FleetError::connection("Unauthorized: invalid token"));
        }
        let session = Arc::new(MockSession::new(bot.id.clone()));
        state.live.insert(bot.id.clone(), Arc::clone(&session));
        Ok(session)
    }

    async fn close_session(&self, session: Arc<dyn Session>) -> Result<(), FleetError> {
        let mut state = lock(&self.state);
        if let Some(mock) = session.as_any().downcast_ref::<MockSession>() {
            mock.closed.store(true, Ordering::SeqCst);
        }
        let id = session.bot_id().clone();
        let owned = state
            .live
            .get(&id)
            .is_some_and(|s| s.session_id == session.session_id());
        if owned {
            state.live.remove(&id);
        }
        *state.closes.entry(id).or_default() += 1;
        Ok(())
    }

    async fn send(
        &self,
        session: &dyn Session,
        chat_id: &ChatId,
        payload: &Payload,
    ) -> Result<DeliveryAck, FleetError> {
        let script = {
            let mut state = lock(&self.state);
            state
                .attempts
                .push((session.bot_id().clone(), chat_id.clone(), payload.clone()));
            state
                .scripts
                .get_mut(chat_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(SendScript::Ack)
        };

        let closed = session
            .as_any()
            .downcast_ref::<MockSession>()
            .is_some_and(MockSession::is_closed);
        if closed {
            return Err(FleetError::transient("session closed"));
        }

        match script {
            SendScript::Ack => {}
            SendScript::Delay(d) => tokio::time::sleep(d).await,
            SendScript::Transient(msg) => return Err(FleetError::transient(msg)),
            SendScript::RetryAfter(d) => {
                return Err(FleetError::Transient {
                    message: "Too Many Requests".into(),
                    retry_after: Some(d),
                    source: None,
                });
            }
            SendScript::Permanent(msg) => return Err(FleetError::permanent(msg)),
        }

        let message_id = self.next_message_id();
        lock(&self.state).sent.push(SentMessage {
            bot_id: session.bot_id().clone(),
            chat_id: chat_id.clone(),
            payload: payload.clone(),
            message_id: message_id.clone(),
        });
        Ok(DeliveryAck { message_id })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::types::BotConfig;

    fn bot(id: &str, token: &str) -> BotConnection {
        BotConnection::from_config(BotConfig::new(id, id, token), Utc::now())
    }

    #[tokio::test]
    async fn refused_token_fails_to_open() {
        let transport = MockTransport::new();
        transport.refuse_token("bad");
        let err = transport.open_session(&bot("a", "bad")).await.err().unwrap();
        assert!(matches!(err, FleetError::Connection { .. }));
        assert_eq!(transport.open_count("a"), 1);
        assert!(!transport.is_live("a"));
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let transport = MockTransport::new();
        let session = transport.open_session(&bot("a", "ok")).await.unwrap();
        transport.script("42", [SendScript::Transient("502".into()), SendScript::Ack]);
        let chat = ChatId::from("42");
        let payload = Payload::text("hi");

        assert!(transport.send(session.as_ref(), &chat, &payload).await.is_err());
        assert!(transport.send(session.as_ref(), &chat, &payload).await.is_ok());
        assert_eq!(transport.attempt_count("42"), 2);
        assert_eq!(transport.sent_texts("42"), ["hi"]);
    }

    #[tokio::test]
    async fn closing_a_replaced_session_keeps_the_new_one() {
        let transport = MockTransport::new();
        let first = transport.open_session(&bot("a", "ok")).await.unwrap();
        let _second = transport.open_session(&bot("a", "ok")).await.unwrap();
        transport.close_session(first).await.unwrap();
        assert!(transport.is_live("a"));
    }

    #[tokio::test]
    async fn injected_events_reach_the_session_stream() {
        let transport = MockTransport::new();
        let session = transport.open_session(&bot("a", "ok")).await.unwrap();
        let mut events = session.take_events().unwrap();
        assert!(session.take_events().is_none());

        assert!(transport.inject_inbound("a", "7", "hello"));
        assert!(transport.inject_fault("a", "poll failed"));
        assert!(matches!(events.recv().await, Some(SessionEvent::Inbound(m)) if m.text.as_deref() == Some("hello")));
        assert_eq!(events.recv().await, Some(SessionEvent::Fault("poll failed".into())));
    }
}
