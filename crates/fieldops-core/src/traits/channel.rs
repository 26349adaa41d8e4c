// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging channel trait for the chat platform integration.

use async_trait::async_trait;

use crate::error::FieldopsError;
use crate::traits::adapter::Adapter;
use crate::types::{InboundEvent, MessageId, OutboundMessage, UserId};

/// Adapter for the bidirectional messaging channel.
///
/// The channel delivers normalized [`InboundEvent`]s (text, location, image)
/// and accepts outbound messages either as a reply bound to a one-shot token
/// or as an unsolicited push to a user id. Image payloads are not inlined in
/// events; they are fetched on demand by message id.
#[async_trait]
pub trait MessagingChannel: Adapter {
    /// Receives the next inbound event from the channel.
    ///
    /// Cancel-safe: dropping the future leaves the event queued.
    async fn receive(&self) -> Result<InboundEvent, FieldopsError>;

    /// Replies within a live event's delivery window.
    async fn reply(&self, token: &str, messages: Vec<OutboundMessage>) -> Result<(), FieldopsError>;

    /// Pushes messages to a user outside any delivery window (sweeper
    /// notifications, warnings issued from background tasks).
    async fn push(&self, user: &UserId, messages: Vec<OutboundMessage>)
    -> Result<(), FieldopsError>;

    /// Downloads the raw bytes of an image message.
    async fn download_content(&self, message_id: &MessageId) -> Result<Vec<u8>, FieldopsError>;
}
