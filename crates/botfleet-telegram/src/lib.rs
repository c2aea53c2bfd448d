// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport adapter for the Botfleet bot operator.
//!
//! Implements [`TransportAdapter`] for the Telegram Bot API via teloxide:
//! one session per bot token, long polling (or webhook registration) for
//! inbound messages, and text or media delivery with errors classified as
//! transient or permanent.

pub mod handler;
pub mod media;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;
use botfleet_config::model::TelegramConfig;
use botfleet_core::error::FleetError;
use botfleet_core::traits::{PluginAdapter, Session, TransportAdapter};
use botfleet_core::types::{
    AdapterType, BotConnection, ChatId, DeliveryAck, HealthStatus, Payload, PayloadKind,
};
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use session::TelegramSession;

/// Buffered inbound events per session before polling waits on the monitor.
const SESSION_EVENT_BUFFER: usize = 100;

/// Telegram transport implementing [`TransportAdapter`].
pub struct TelegramTransport {
    config: TelegramConfig,
    api_url: Option<reqwest::Url>,
}

impl TelegramTransport {
    /// Creates the transport. Fails if `telegram.api_url` is not a valid URL.
    pub fn new(config: TelegramConfig) -> Result<Self, FleetError> {
        let api_url = config
            .api_url
            .as_deref()
            .map(reqwest::Url::parse)
            .transpose()
            .map_err(|e| FleetError::Config(format!("telegram.api_url is invalid: {e}")))?;
        Ok(Self { config, api_url })
    }

    fn client(&self, token: &str) -> Bot {
        let bot = Bot::new(token);
        match &self.api_url {
            Some(url) => bot.set_api_url(url.clone()),
            None => bot,
        }
    }
}

#[async_trait]
impl PluginAdapter for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, FleetError> {
        // Per-bot connectivity is tracked by the lifecycle monitor.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FleetError> {
        debug!("Telegram transport shutting down");
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for TelegramTransport {
    async fn open_session(&self, bot: &BotConnection) -> Result<Arc<dyn Session>, FleetError> {
        let client = self.client(&bot.token);

        let me = client.get_me().await.map_err(|e| FleetError::Connection {
            message: format!("getMe failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let (tx, rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        let cancel = CancellationToken::new();

        match bot.webhook_url.as_deref() {
            Some(target) => {
                let url = reqwest::Url::parse(target).map_err(|e| {
                    FleetError::connection(format!("invalid webhook url `{target}`: {e}"))
                })?;
                client
                    .set_webhook(url)
                    .await
                    .map_err(|e| FleetError::Connection {
                        message: format!("setWebhook failed: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                info!(bot_id = %bot.id, username = ?me.user.username, "webhook registered");
            }
            None => {
                // getUpdates is refused while a webhook is set.
                client
                    .delete_webhook()
                    .await
                    .map_err(|e| FleetError::Connection {
                        message: format!("deleteWebhook failed: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                tokio::spawn(session::poll_updates(
                    client.clone(),
                    bot.id.clone(),
                    self.config.poll_timeout_secs,
                    tx,
                    cancel.clone(),
                ));
                info!(bot_id = %bot.id, username = ?me.user.username, "session opened");
            }
        }

        Ok(Arc::new(TelegramSession::new(
            bot.id.clone(),
            client,
            rx,
            cancel,
        )))
    }

    async fn close_session(&self, session: Arc<dyn Session>) -> Result<(), FleetError> {
        if let Some(telegram) = session.as_any().downcast_ref::<TelegramSession>() {
            telegram.stop();
        }
        debug!(bot_id = %session.bot_id(), "session closed");
        Ok(())
    }

    async fn send(
        &self,
        session: &dyn Session,
        chat_id: &ChatId,
        payload: &Payload,
    ) -> Result<DeliveryAck, FleetError> {
        let telegram = session
            .as_any()
            .downcast_ref::<TelegramSession>()
            .ok_or_else(|| FleetError::Internal("session was not opened by Telegram".into()))?;
        let bot = telegram.bot();
        let to = media::recipient(chat_id.as_str())?;

        let result = match payload.kind {
            PayloadKind::Text => bot.send_message(to, &payload.body).await,
            PayloadKind::Photo => {
                let mut request = bot.send_photo(to, media::input_file(&payload.body));
                if let Some(caption) = &payload.caption {
                    request = request.caption(caption);
                }
                request.await
            }
            PayloadKind::Video => {
                let mut request = bot.send_video(to, media::input_file(&payload.body));
                if let Some(caption) = &payload.caption {
                    request = request.caption(caption);
                }
                request.await
            }
            PayloadKind::Document => {
                let mut request = bot.send_document(to, media::input_file(&payload.body));
                if let Some(caption) = &payload.caption {
                    request = request.caption(caption);
                }
                request.await
            }
        };

        match result {
            Ok(sent) => Ok(DeliveryAck {
                message_id: sent.id.0.to_string(),
            }),
            Err(e) => {
                let err = classify(e);
                warn!(bot_id = %session.bot_id(), chat_id = %chat_id, error = %err, "Telegram send failed");
                Err(err)
            }
        }
    }
}

/// Maps a Bot API failure onto the fleet's retry classes.
pub fn classify(e: RequestError) -> FleetError {
    match e {
        RequestError::RetryAfter(secs) => FleetError::Transient {
            message: format!("rate limited: {e}"),
            retry_after: Some(secs.duration()),
            source: None,
        },
        RequestError::Api(ref api) if api_error_is_transient(api) => FleetError::Transient {
            message: e.to_string(),
            retry_after: None,
            source: Some(Box::new(e)),
        },
        RequestError::Api(_) | RequestError::MigrateToChatId(_) => FleetError::Permanent {
            message: e.to_string(),
            source: Some(Box::new(e)),
        },
        _ => FleetError::Transient {
            message: e.to_string(),
            retry_after: None,
            source: Some(Box::new(e)),
        },
    }
}

/// Server-side failures Telegram reports through the API error channel.
fn api_error_is_transient(api: &ApiError) -> bool {
    match api {
        ApiError::Unknown(description) => {
            let description = description.to_ascii_lowercase();
            ["internal server error", "bad gateway", "gateway timeout", "too many requests"]
                .iter()
                .any(|marker| description.contains(marker))
        }
        _ => false,
    }
}
