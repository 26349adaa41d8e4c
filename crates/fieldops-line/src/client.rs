// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the LINE Messaging API.
//!
//! Provides [`LineClient`] for reply, push, and content download against
//! the two LINE hosts (`api.line.me` for messaging, `api-data.line.me`
//! for content), with quick-reply button rendering.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

use fieldops_core::error::FieldopsError;
use fieldops_core::types::{MessageId, OutboundMessage, QuickActionKind, UserId};

/// Base URL for the Messaging API (reply, push, bot info).
const API_BASE_URL: &str = "https://api.line.me";

/// Base URL for message content downloads.
const DATA_BASE_URL: &str = "https://api-data.line.me";

/// LINE caps one reply or push call at five message objects.
const MAX_MESSAGES_PER_CALL: usize = 5;

/// LINE caps a quick reply at thirteen items.
const MAX_QUICK_ACTIONS: usize = 13;

/// How many times a failed push is retried on transient errors. Replies
/// are never retried; their tokens are single-use.
const MAX_PUSH_RETRIES: u32 = 1;

/// HTTP client for LINE Messaging API communication.
#[derive(Debug, Clone)]
pub struct LineClient {
    http: reqwest::Client,
    api_base: String,
    data_base: String,
}

impl LineClient {
    /// Creates a new Messaging API client authenticated with the channel
    /// access token.
    pub fn new(channel_access_token: &str) -> Result<Self, FieldopsError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {channel_access_token}");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&bearer).map_err(|e| {
                FieldopsError::Config(format!("invalid channel access token header value: {e}"))
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FieldopsError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            api_base: API_BASE_URL.to_string(),
            data_base: DATA_BASE_URL.to_string(),
        })
    }

    /// Points both hosts at one server (for testing with wiremock).
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: String) -> Self {
        self.api_base = url.clone();
        self.data_base = url;
        self
    }

    /// Sends messages bound to a reply token.
    ///
    /// Not retried: reply tokens are single-use, so a second attempt after
    /// a half-delivered first can never succeed.
    pub async fn reply(
        &self,
        token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), FieldopsError> {
        if messages.is_empty() {
            return Ok(());
        }
        let request = ReplyRequest {
            reply_token: token,
            messages: render_messages(messages),
        };

        let response = self
            .http
            .post(format!("{}/v2/bot/message/reply", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| FieldopsError::Channel {
                message: format!("LINE reply request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, "reply response received");
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(FieldopsError::Channel {
            message: format!("LINE reply returned {status}: {body}"),
            source: None,
        })
    }

    /// Pushes messages to a user outside any reply window.
    ///
    /// On transient errors (429, 500, 503), retries once after a 1-second
    /// delay.
    pub async fn push(
        &self,
        user: &UserId,
        messages: &[OutboundMessage],
    ) -> Result<(), FieldopsError> {
        if messages.is_empty() {
            return Ok(());
        }
        let request = PushRequest {
            to: &user.0,
            messages: render_messages(messages),
        };

        let mut last_error = None;

        for attempt in 0..=MAX_PUSH_RETRIES {
            if attempt > 0 {
                warn!(attempt, "retrying push after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .http
                .post(format!("{}/v2/bot/message/push", self.api_base))
                .json(&request)
                .send()
                .await
                .map_err(|e| FieldopsError::Channel {
                    message: format!("LINE push request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "push response received");

            if status.is_success() {
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < MAX_PUSH_RETRIES {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(FieldopsError::Channel {
                    message: format!("LINE push returned {status}: {body}"),
                    source: None,
                });
                continue;
            }

            return Err(FieldopsError::Channel {
                message: format!("LINE push returned {status}: {body}"),
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| FieldopsError::Channel {
            message: "push failed after retries".into(),
            source: None,
        }))
    }

    /// Downloads the raw bytes of an image message from the data host.
    pub async fn download_content(&self, message_id: &MessageId) -> Result<Vec<u8>, FieldopsError> {
        let url = format!("{}/v2/bot/message/{}/content", self.data_base, message_id.0);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FieldopsError::Channel {
                message: format!("LINE content download failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldopsError::Channel {
                message: format!("LINE content download returned {status}: {body}"),
                source: None,
            });
        }

        let bytes = response.bytes().await.map_err(|e| FieldopsError::Channel {
            message: format!("failed to read content body: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(bytes.to_vec())
    }

    /// Confirms the access token by fetching the bot's own profile.
    pub async fn bot_info(&self) -> Result<(), FieldopsError> {
        let response = self
            .http
            .get(format!("{}/v2/bot/info", self.api_base))
            .send()
            .await
            .map_err(|e| FieldopsError::Channel {
                message: format!("LINE bot info request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(FieldopsError::Channel {
            message: format!("LINE bot info returned {status}"),
            source: None,
        })
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

// --- LINE messaging wire format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<MessagePayload>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<MessagePayload>,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(rename = "quickReply", skip_serializing_if = "Option::is_none")]
    quick_reply: Option<QuickReplyPayload>,
}

#[derive(Debug, Serialize)]
struct QuickReplyPayload {
    items: Vec<QuickReplyItem>,
}

#[derive(Debug, Serialize)]
struct QuickReplyItem {
    #[serde(rename = "type")]
    kind: &'static str,
    action: ActionPayload,
}

/// Quick-reply actions in the shapes LINE expects. The serde tag names
/// match the wire values (`camera`, `cameraRoll`, `message`, `uri`).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ActionPayload {
    Camera { label: String },
    CameraRoll { label: String },
    Message { label: String, text: String },
    Uri { label: String, uri: String },
}

fn render_messages(messages: &[OutboundMessage]) -> Vec<MessagePayload> {
    if messages.len() > MAX_MESSAGES_PER_CALL {
        warn!(
            count = messages.len(),
            "truncating to {MAX_MESSAGES_PER_CALL} messages per call"
        );
    }
    messages
        .iter()
        .take(MAX_MESSAGES_PER_CALL)
        .map(render_message)
        .collect()
}

fn render_message(message: &OutboundMessage) -> MessagePayload {
    let quick_reply = if message.quick_actions.is_empty() {
        None
    } else {
        if message.quick_actions.len() > MAX_QUICK_ACTIONS {
            warn!(
                count = message.quick_actions.len(),
                "truncating to {MAX_QUICK_ACTIONS} quick-reply items"
            );
        }
        let items = message
            .quick_actions
            .iter()
            .take(MAX_QUICK_ACTIONS)
            .map(|action| QuickReplyItem {
                kind: "action",
                action: match &action.kind {
                    QuickActionKind::Camera => ActionPayload::Camera {
                        label: action.label.clone(),
                    },
                    QuickActionKind::CameraRoll => ActionPayload::CameraRoll {
                        label: action.label.clone(),
                    },
                    QuickActionKind::Message(text) => ActionPayload::Message {
                        label: action.label.clone(),
                        text: text.clone(),
                    },
                    QuickActionKind::Uri(uri) => ActionPayload::Uri {
                        label: action.label.clone(),
                        uri: uri.clone(),
                    },
                },
            })
            .collect();
        Some(QuickReplyPayload { items })
    };

    MessagePayload {
        kind: "text",
        text: message.text.clone(),
        quick_reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::types::QuickAction;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> LineClient {
        LineClient::new("test-channel-token")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    #[test]
    fn plain_text_renders_without_quick_reply() {
        let value = serde_json::to_value(render_message(&OutboundMessage::text("hi"))).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hi");
        assert!(value.get("quickReply").is_none());
    }

    #[test]
    fn quick_actions_render_in_line_wire_shapes() {
        let message = OutboundMessage::with_actions(
            "pick one",
            vec![
                QuickAction {
                    label: "camera".into(),
                    kind: QuickActionKind::Camera,
                },
                QuickAction {
                    label: "roll".into(),
                    kind: QuickActionKind::CameraRoll,
                },
                QuickAction {
                    label: "finish".into(),
                    kind: QuickActionKind::Message("done".into()),
                },
                QuickAction {
                    label: "map".into(),
                    kind: QuickActionKind::Uri("https://liff.line.me/app".into()),
                },
            ],
        );

        let value = serde_json::to_value(render_message(&message)).unwrap();
        let items = &value["quickReply"]["items"];
        assert_eq!(items[0]["type"], "action");
        assert_eq!(items[0]["action"]["type"], "camera");
        assert_eq!(items[1]["action"]["type"], "cameraRoll");
        assert_eq!(items[2]["action"]["type"], "message");
        assert_eq!(items[2]["action"]["text"], "done");
        assert_eq!(items[3]["action"]["type"], "uri");
        assert_eq!(items[3]["action"]["uri"], "https://liff.line.me/app");
    }

    #[test]
    fn oversized_batches_are_truncated() {
        let messages: Vec<_> = (0..7).map(|i| OutboundMessage::text(format!("{i}"))).collect();
        assert_eq!(render_messages(&messages).len(), MAX_MESSAGES_PER_CALL);
    }

    #[tokio::test]
    async fn reply_posts_the_token_and_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(body_partial_json(serde_json::json!({
                "replyToken": "tok",
                "messages": [{"type": "text", "text": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .reply("tok", &[OutboundMessage::text("hello")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reply_with_a_dead_token_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "Invalid reply token"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .reply("stale", &[OutboundMessage::text("late")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn push_addresses_the_user_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .and(body_partial_json(serde_json::json!({"to": "U1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .push(&UserId("U1".into()), &[OutboundMessage::text("reminder")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn push_retries_once_on_500() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .push(&UserId("U1".into()), &[OutboundMessage::text("again")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_message_lists_never_hit_the_network() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and fail the calls.
        let client = test_client(&server.uri());
        client.reply("tok", &[]).await.unwrap();
        client.push(&UserId("U1".into()), &[]).await.unwrap();
    }

    #[tokio::test]
    async fn downloads_content_bytes_from_the_data_host() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/bot/message/m1/content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let bytes = client
            .download_content(&MessageId("m1".into()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/bot/message/gone/content"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(client
            .download_content(&MessageId("gone".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn bot_info_reports_token_health() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/bot/info"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(client.bot_info().await.is_err());
    }
}
