// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the registry, monitor, dispatcher, and adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque identifier of a registered bot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(pub String);

impl BotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BotId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Chat or recipient identifier on the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a queued outbound job. Monotonic in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Transport,
}

// --- Bot connections ---

/// Operator-supplied settings for registering a new bot.
#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub id: BotId,
    pub name: String,
    pub token: String,
    pub webhook_url: Option<String>,
}

impl BotConfig {
    pub fn new(id: impl Into<BotId>, name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            token: token.into(),
            webhook_url: None,
        }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &mask_token(&self.token))
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// A registered bot identity and the operator's intent for it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConnection {
    pub id: BotId,
    pub name: String,
    pub token: String,
    /// Operator intent: should a live session exist for this bot?
    pub desired_enabled: bool,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotConnection {
    /// Builds a fresh, disabled-until-confirmed connection from its config.
    pub fn from_config(config: BotConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: config.id,
            name: config.name,
            token: config.token,
            desired_enabled: false,
            webhook_url: config.webhook_url,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for BotConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &mask_token(&self.token))
            .field("desired_enabled", &self.desired_enabled)
            .field("webhook_url", &self.webhook_url)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Masks a bot token for logs, keeping the numeric bot part and the last 4 chars.
pub fn mask_token(token: &str) -> String {
    let (head, secret) = token.split_once(':').unwrap_or(("", token));
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if head.is_empty() {
        format!("***{tail}")
    } else {
        format!("{head}:***{tail}")
    }
}

// --- Connection status ---

/// Externally visible connectivity state of a bot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Online,
    Offline,
    Error,
}

/// Connectivity status of one bot, owned by the lifecycle monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub kind: StatusKind,
    /// When the bot entered this status.
    pub since: DateTime<Utc>,
    pub detail: Option<String>,
}

impl ConnectionStatus {
    pub fn offline(since: DateTime<Utc>) -> Self {
        Self {
            kind: StatusKind::Offline,
            since,
            detail: None,
        }
    }

    pub fn online(since: DateTime<Utc>) -> Self {
        Self {
            kind: StatusKind::Online,
            since,
            detail: None,
        }
    }

    pub fn error(since: DateTime<Utc>, detail: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            since,
            detail: Some(detail.into()),
        }
    }
}

// --- Outbound jobs ---

/// Kind of content carried by a payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Text,
    Photo,
    Video,
    Document,
}

/// Message content: text, or a media reference (URL or local path) with an
/// optional caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub kind: PayloadKind,
    pub body: String,
    pub caption: Option<String>,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Text,
            body: text.into(),
            caption: None,
        }
    }

    pub fn media(kind: PayloadKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            body: reference.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// A send request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundJob {
    pub bot_id: BotId,
    pub chat_id: ChatId,
    pub payload: Payload,
    /// Earliest delivery time; `None` means as soon as possible.
    pub not_before: Option<DateTime<Utc>>,
}

impl OutboundJob {
    pub fn new(bot_id: impl Into<BotId>, chat_id: impl Into<ChatId>, payload: Payload) -> Self {
        Self {
            bot_id: bot_id.into(),
            chat_id: chat_id.into(),
            payload,
            not_before: None,
        }
    }

    pub fn text(
        bot_id: impl Into<BotId>,
        chat_id: impl Into<ChatId>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(bot_id, chat_id, Payload::text(text))
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }
}

/// Key under which jobs are serialized: one (bot, chat) pair.
pub fn recipient_key(bot_id: &BotId, chat_id: &ChatId) -> String {
    format!("{}:{}", bot_id.0, chat_id.0)
}

/// Lifecycle status of a queued job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its `not_before` time (first attempt or retry).
    Pending,
    /// Claimed by a worker.
    Processing,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// A job as handed to the persistence collaborator for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobRecord {
    pub bot_id: BotId,
    pub chat_id: ChatId,
    pub payload: Payload,
    pub max_attempts: u32,
    pub not_before: DateTime<Utc>,
}

/// A durable job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub bot_id: BotId,
    pub chat_id: ChatId,
    pub payload: Payload,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub not_before: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn recipient_key(&self) -> String {
        recipient_key(&self.bot_id, &self.chat_id)
    }
}

// --- Transport values ---

/// Platform acknowledgement of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub message_id: String,
}

/// A message received by one of the fleet's bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub bot_id: BotId,
    pub chat_id: ChatId,
    pub message_id: String,
    pub kind: PayloadKind,
    pub text: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Something a live session reports back to the lifecycle monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Inbound(InboundMessage),
    /// The session lost connectivity (polling error, revoked token, ...).
    Fault(String),
}
