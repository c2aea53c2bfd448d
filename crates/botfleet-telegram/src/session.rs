// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One bot's live Telegram session and its long-polling loop.

use std::any::Any;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use botfleet_core::traits::Session;
use botfleet_core::types::{BotId, SessionEvent};
use teloxide::RequestError;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler;

/// A connected bot: its API client plus the stream the monitor reads.
pub struct TelegramSession {
    bot_id: BotId,
    session_id: String,
    bot: Bot,
    events: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    cancel: CancellationToken,
}

impl TelegramSession {
    pub(crate) fn new(
        bot_id: BotId,
        bot: Bot,
        events: mpsc::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bot_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            bot,
            events: Mutex::new(Some(events)),
            cancel,
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Stops the polling loop, if any.
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Session for TelegramSession {
    fn bot_id(&self) -> &BotId {
        &self.bot_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Long-polls `getUpdates` until cancelled or the API fails.
///
/// Inbound messages are forwarded as they arrive. Any failure other than a
/// flood wait is reported once as a fault and ends the loop; the monitor
/// then replaces the session.
pub(crate) async fn poll_updates(
    bot: Bot,
    bot_id: BotId,
    poll_timeout: u32,
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut offset: i32 = 0;
    info!(bot_id = %bot_id, "starting Telegram long polling");

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = bot.get_updates().offset(offset).timeout(poll_timeout).send() => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = next_offset(update.id.0);
                    match handler::inbound_from_update(&bot_id, &update) {
                        Some(message) => {
                            if tx.send(SessionEvent::Inbound(message)).await.is_err() {
                                debug!(bot_id = %bot_id, "session events dropped, stopping poll");
                                return;
                            }
                        }
                        None => debug!(bot_id = %bot_id, update_id = update.id.0, "ignoring update"),
                    }
                }
            }
            Err(RequestError::RetryAfter(secs)) => {
                let wait: Duration = secs.duration();
                warn!(bot_id = %bot_id, wait = ?wait, "getUpdates rate limited");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(e) => {
                warn!(bot_id = %bot_id, error = %e, "getUpdates failed");
                // The monitor may have stopped listening already.
                let _ = tx.send(SessionEvent::Fault(format!("polling failed: {e}"))).await;
                return;
            }
        }
    }

    debug!(bot_id = %bot_id, "Telegram long polling stopped");
}

fn next_offset(update_id: u32) -> i32 {
    i32::try_from(update_id).unwrap_or(i32::MAX).saturating_add(1)
}
