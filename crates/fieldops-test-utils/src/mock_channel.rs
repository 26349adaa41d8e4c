// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging channel for deterministic testing.
//!
//! `MockChannel` implements `MessagingChannel` with an injectable inbound
//! queue and full capture of outbound traffic, enabling fast, CI-runnable
//! tests without a live chat platform. Image bytes for `download_content`
//! are staged per message id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use fieldops_core::types::{AdapterType, HealthStatus};
use fieldops_core::{
    Adapter, FieldopsError, InboundEvent, MessageId, MessagingChannel, OutboundMessage, UserId,
};

/// How a captured outbound delivery was routed.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Sent against a live reply token.
    Reply { token: String },
    /// Pushed to a user outside any delivery window.
    Push { user: UserId },
}

/// One captured outbound delivery.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub via: Delivery,
    pub messages: Vec<OutboundMessage>,
}

/// A mock channel with an injectable event queue and outbound capture.
///
/// Events are popped in FIFO order; `receive()` waits when the queue is
/// empty, so tests can inject from another task.
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundEvent>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    content: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    notify: Arc<Notify>,
    fail_replies: AtomicUsize,
}

impl MockChannel {
    /// Create a mock channel with an empty event queue.
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            content: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            fail_replies: AtomicUsize::new(0),
        }
    }

    /// Queue an inbound event for the next `receive()` call.
    pub async fn inject_event(&self, event: InboundEvent) {
        self.inbound.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// Stage downloadable bytes for an image message id.
    pub async fn stage_content(&self, message_id: &MessageId, bytes: Vec<u8>) {
        self.content
            .lock()
            .await
            .insert(message_id.0.clone(), bytes);
    }

    /// Arm the next `n` replies to fail, forcing the push fallback.
    pub fn fail_next_replies(&self, n: usize) {
        self.fail_replies.store(n, Ordering::SeqCst);
    }

    /// All captured outbound deliveries, in send order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Number of captured outbound deliveries.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Message texts across all captured deliveries, flattened in order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .flat_map(|s| s.messages.iter().map(|m| m.text.clone()))
            .collect()
    }

    /// Clear captured outbound deliveries.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for MockChannel {
    async fn receive(&self) -> Result<InboundEvent, FieldopsError> {
        loop {
            if let Some(event) = self.inbound.lock().await.pop_front() {
                return Ok(event);
            }
            self.notify.notified().await;
        }
    }

    async fn reply(
        &self,
        token: &str,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), FieldopsError> {
        if self
            .fail_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FieldopsError::Channel {
                message: "injected reply failure".into(),
                source: None,
            });
        }
        self.sent.lock().await.push(SentMessage {
            via: Delivery::Reply {
                token: token.to_string(),
            },
            messages,
        });
        Ok(())
    }

    async fn push(
        &self,
        user: &UserId,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), FieldopsError> {
        self.sent.lock().await.push(SentMessage {
            via: Delivery::Push { user: user.clone() },
            messages,
        });
        Ok(())
    }

    async fn download_content(&self, message_id: &MessageId) -> Result<Vec<u8>, FieldopsError> {
        self.content
            .lock()
            .await
            .get(&message_id.0)
            .cloned()
            .ok_or_else(|| FieldopsError::Channel {
                message: format!("no staged content for message {message_id}"),
                source: None,
            })
    }
}
