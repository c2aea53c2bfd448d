// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of incoming Telegram updates into fleet messages.

use botfleet_core::types::{BotId, ChatId, InboundMessage, PayloadKind};
use teloxide::types::{Message, Update, UpdateKind};

/// The content kind of a message, if it is one the fleet reports.
///
/// Stickers, locations, service messages and the like return `None`.
pub fn content_kind(msg: &Message) -> Option<PayloadKind> {
    if msg.text().is_some() {
        Some(PayloadKind::Text)
    } else if msg.photo().is_some() {
        Some(PayloadKind::Photo)
    } else if msg.video().is_some() {
        Some(PayloadKind::Video)
    } else if msg.document().is_some() {
        Some(PayloadKind::Document)
    } else {
        None
    }
}

/// Converts a Telegram message received by `bot_id` into an [`InboundMessage`].
pub fn to_inbound_message(bot_id: &BotId, msg: &Message) -> Option<InboundMessage> {
    let kind = content_kind(msg)?;
    Some(InboundMessage {
        bot_id: bot_id.clone(),
        chat_id: ChatId::from(msg.chat.id.0),
        message_id: msg.id.0.to_string(),
        kind,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        received_at: msg.date,
    })
}

/// Extracts the reportable message from an update. Edits, callbacks and
/// other update kinds are skipped.
pub fn inbound_from_update(bot_id: &BotId, update: &Update) -> Option<InboundMessage> {
    match &update.kind {
        UpdateKind::Message(msg) => to_inbound_message(bot_id, msg),
        _ => None,
    }
}
