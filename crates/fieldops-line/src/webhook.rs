// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook server for inbound LINE events.
//!
//! One axum route pair: `POST /webhook` authenticates the raw body against
//! the `x-line-signature` header, parses the event batch, and forwards
//! normalized [`InboundEvent`]s to the engine over an mpsc channel;
//! `GET /healthz` answers liveness probes. The handler acknowledges with
//! 200 as soon as events are enqueued; all flow work happens downstream.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use metrics::counter;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use fieldops_config::model::LineConfig;
use fieldops_core::error::FieldopsError;
use fieldops_core::types::{EventKind, InboundEvent, LocationFix, MessageId, UserId};

use crate::signature;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    /// Channel for handing parsed events to the engine loop.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    /// Channel secret the signature check is keyed on.
    pub channel_secret: String,
}

/// Builds the webhook router over the given state.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves the webhook router until the
/// server future is dropped or fails.
pub async fn serve(config: &LineConfig, state: WebhookState) -> Result<(), FieldopsError> {
    let app = router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| FieldopsError::Channel {
                message: format!("failed to bind webhook server to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;

    info!("webhook server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| FieldopsError::Channel {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn receive_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
    else {
        warn!("webhook request without x-line-signature header");
        counter!("fieldops_webhook_rejected_total").increment(1);
        return StatusCode::UNAUTHORIZED;
    };

    if !signature::verify(&state.channel_secret, &body, signature) {
        warn!("webhook signature mismatch");
        counter!("fieldops_webhook_rejected_total").increment(1);
        return StatusCode::UNAUTHORIZED;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // Authenticated but unparseable. Acknowledge anyway so LINE does
            // not redeliver a body we will never understand.
            warn!(error = %e, "discarding unparseable webhook body");
            return StatusCode::OK;
        }
    };

    for event in payload.events {
        let Some(inbound) = parse_event(event) else {
            continue;
        };
        counter!("fieldops_webhook_events_total").increment(1);
        if state.inbound_tx.send(inbound).await.is_err() {
            warn!("inbound channel closed, dropping webhook event");
        }
    }

    StatusCode::OK
}

// --- LINE webhook wire format ---
//
// Every field is defaulted so one odd event cannot fail the whole batch;
// parse_event drops events that are missing something it needs.

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

/// Normalizes one raw webhook event, or drops it.
///
/// Only `message` events with a user source count; follows, unfollows,
/// stickers, and the rest of the LINE event zoo are ignored here.
fn parse_event(event: RawEvent) -> Option<InboundEvent> {
    if event.kind != "message" {
        debug!(kind = %event.kind, "ignoring non-message webhook event");
        return None;
    }

    let Some(user_id) = event.source.and_then(|s| s.user_id) else {
        debug!("ignoring message event without a user id");
        return None;
    };

    let message = event.message?;
    let kind = match message.kind.as_str() {
        "text" => EventKind::Text(message.text.unwrap_or_default()),
        "location" => EventKind::Location(LocationFix {
            latitude: message.latitude?,
            longitude: message.longitude?,
            address: message.address,
        }),
        "image" => {
            if message.id.is_empty() {
                return None;
            }
            EventKind::Image {
                message_id: MessageId(message.id),
            }
        }
        other => {
            debug!(message_type = %other, "ignoring unsupported message type");
            return None;
        }
    };

    Some(InboundEvent {
        user_id: UserId(user_id),
        reply_token: event.reply_token,
        kind,
    })
}
