// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound addressing and media references.

use std::path::PathBuf;

use botfleet_core::error::FleetError;
use teloxide::types::{ChatId, InputFile, Recipient};

/// Parses a fleet chat id into a Telegram recipient.
///
/// Numeric ids address chats directly; `@name` addresses a public channel
/// or supergroup by username.
pub fn recipient(chat_id: &str) -> Result<Recipient, FleetError> {
    let chat_id = chat_id.trim();
    if let Ok(id) = chat_id.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if chat_id.len() > 1 && chat_id.starts_with('@') {
        return Ok(Recipient::ChannelUsername(chat_id.to_string()));
    }
    Err(FleetError::permanent(format!("invalid chat id `{chat_id}`")))
}

/// Media reference: an http(s) URL is fetched by Telegram, anything else
/// is uploaded from the local filesystem.
pub fn input_file(reference: &str) -> InputFile {
    match reqwest::Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => InputFile::url(url),
        _ => InputFile::file(PathBuf::from(reference)),
    }
}
