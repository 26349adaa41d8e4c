// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LINE channel adapter for Fieldops.
//!
//! Implements [`MessagingChannel`] for the LINE Messaging API: a
//! signature-verified webhook server feeds normalized events into an
//! in-process queue, and replies, pushes, and content downloads go out
//! through [`client::LineClient`].

pub mod client;
pub mod signature;
pub mod webhook;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use fieldops_config::model::LineConfig;
use fieldops_core::error::FieldopsError;
use fieldops_core::traits::{Adapter, MessagingChannel};
use fieldops_core::types::{AdapterType, HealthStatus, InboundEvent, MessageId, OutboundMessage, UserId};

/// LINE channel adapter implementing [`MessagingChannel`].
///
/// Webhook deliveries arrive over HTTP (see [`webhook::serve`]) and are
/// queued internally; [`MessagingChannel::receive`] drains that queue.
pub struct LineChannel {
    client: client::LineClient,
    channel_secret: String,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl LineChannel {
    /// Creates a new LINE channel adapter.
    ///
    /// Requires `config.channel_access_token` and `config.channel_secret`
    /// to be set.
    pub fn new(config: &LineConfig) -> Result<Self, FieldopsError> {
        let token = config.channel_access_token.as_deref().ok_or_else(|| {
            FieldopsError::Config("line.channel_access_token is required to serve".into())
        })?;
        if token.is_empty() {
            return Err(FieldopsError::Config(
                "line.channel_access_token cannot be empty".into(),
            ));
        }

        let secret = config.channel_secret.as_deref().ok_or_else(|| {
            FieldopsError::Config("line.channel_secret is required to serve".into())
        })?;
        if secret.is_empty() {
            return Err(FieldopsError::Config(
                "line.channel_secret cannot be empty".into(),
            ));
        }

        let client = client::LineClient::new(token)?;
        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            client,
            channel_secret: secret.to_string(),
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
        })
    }

    /// State for the webhook server that feeds this channel.
    pub fn webhook_state(&self) -> webhook::WebhookState {
        webhook::WebhookState {
            inbound_tx: self.inbound_tx.clone(),
            channel_secret: self.channel_secret.clone(),
        }
    }
}

#[async_trait]
impl Adapter for LineChannel {
    fn name(&self) -> &str {
        "line"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        // Confirms the access token by fetching the bot's own profile.
        match self.client.bot_info().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("LINE API unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        debug!("LINE channel shutting down");
        // The webhook server owns its own lifecycle; once it stops feeding
        // the queue, receive() callers drain what is left and get a closed
        // channel error.
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for LineChannel {
    async fn receive(&self) -> Result<InboundEvent, FieldopsError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| FieldopsError::Channel {
            message: "LINE inbound channel closed".into(),
            source: None,
        })
    }

    async fn reply(&self, token: &str, messages: Vec<OutboundMessage>) -> Result<(), FieldopsError> {
        self.client.reply(token, &messages).await
    }

    async fn push(
        &self,
        user: &UserId,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), FieldopsError> {
        self.client.push(user, &messages).await
    }

    async fn download_content(&self, message_id: &MessageId) -> Result<Vec<u8>, FieldopsError> {
        self.client.download_content(message_id).await
    }
}
