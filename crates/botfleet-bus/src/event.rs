// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain events published on the bus.

use botfleet_core::{BotId, ChatId, InboundMessage, JobId, StatusKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Discriminant used to filter subscriptions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BotStatusChanged,
    MessageSent,
    MessageFailed,
    MessageReceived,
}

/// A state change somewhere in the fleet.
///
/// Serialized with a `type` tag so live feed clients can switch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BotStatusChanged {
        at: DateTime<Utc>,
        bot_id: BotId,
        bot_name: String,
        previous: StatusKind,
        status: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    MessageSent {
        at: DateTime<Utc>,
        job_id: JobId,
        bot_id: BotId,
        chat_id: ChatId,
        attempts: u32,
        message_id: String,
    },
    MessageFailed {
        at: DateTime<Utc>,
        job_id: JobId,
        bot_id: BotId,
        chat_id: ChatId,
        attempts: u32,
        error: String,
    },
    MessageReceived {
        at: DateTime<Utc>,
        message: InboundMessage,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BotStatusChanged { .. } => EventKind::BotStatusChanged,
            Self::MessageSent { .. } => EventKind::MessageSent,
            Self::MessageFailed { .. } => EventKind::MessageFailed,
            Self::MessageReceived { .. } => EventKind::MessageReceived,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::BotStatusChanged { at, .. }
            | Self::MessageSent { at, .. }
            | Self::MessageFailed { at, .. }
            | Self::MessageReceived { at, .. } => *at,
        }
    }

    /// The bot the event concerns.
    pub fn bot_id(&self) -> &BotId {
        match self {
            Self::BotStatusChanged { bot_id, .. }
            | Self::MessageSent { bot_id, .. }
            | Self::MessageFailed { bot_id, .. } => bot_id,
            Self::MessageReceived { message, .. } => &message.bot_id,
        }
    }
}
