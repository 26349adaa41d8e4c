// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Fieldops engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable external identity of a chat user, as delivered by the messaging
/// platform. Primary key of the Employees collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one check-in or submission attempt. Minted by the
/// flow that starts the transaction and threaded through every row write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Mints a fresh transaction id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform identifier for an inbound message, used to fetch image content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two field-operations flows. Each has its own geofence radius,
/// JPEG quality, and sheet collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum FlowKind {
    Checkin,
    Submission,
}

impl FlowKind {
    /// Human-readable flow name for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            FlowKind::Checkin => "check-in",
            FlowKind::Submission => "submission",
        }
    }
}

/// Per-employee FSM state, persisted verbatim in the Employees sheet.
///
/// Unknown or empty cell values parse as `Idle` so a hand-edited sheet can
/// never wedge a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum EmployeeState {
    #[default]
    Idle,
    WaitingForCheckinLocation,
    WaitingForCheckinImages,
    WaitingForSubmitLocation,
    WaitingForSubmitImages,
}

impl EmployeeState {
    /// Parses a sheet cell, treating unknown or empty values as `Idle`.
    pub fn from_cell(cell: &str) -> Self {
        cell.parse().unwrap_or_default()
    }

    /// True for every state except `Idle`.
    pub fn is_waiting(&self) -> bool {
        !matches!(self, EmployeeState::Idle)
    }

    /// The flow this state belongs to, if any.
    pub fn flow(&self) -> Option<FlowKind> {
        match self {
            EmployeeState::Idle => None,
            EmployeeState::WaitingForCheckinLocation | EmployeeState::WaitingForCheckinImages => {
                Some(FlowKind::Checkin)
            }
            EmployeeState::WaitingForSubmitLocation | EmployeeState::WaitingForSubmitImages => {
                Some(FlowKind::Submission)
            }
        }
    }

    /// The waiting-for-location state of the given flow.
    pub fn waiting_location(flow: FlowKind) -> Self {
        match flow {
            FlowKind::Checkin => EmployeeState::WaitingForCheckinLocation,
            FlowKind::Submission => EmployeeState::WaitingForSubmitLocation,
        }
    }

    /// The waiting-for-images state of the given flow.
    pub fn waiting_images(flow: FlowKind) -> Self {
        match flow {
            FlowKind::Checkin => EmployeeState::WaitingForCheckinImages,
            FlowKind::Submission => EmployeeState::WaitingForSubmitImages,
        }
    }

    /// True when the state expects a location event next.
    pub fn expects_location(&self) -> bool {
        matches!(
            self,
            EmployeeState::WaitingForCheckinLocation | EmployeeState::WaitingForSubmitLocation
        )
    }

    /// True when the state expects image events next.
    pub fn expects_images(&self) -> bool {
        matches!(
            self,
            EmployeeState::WaitingForCheckinImages | EmployeeState::WaitingForSubmitImages
        )
    }
}

/// Transaction row status, persisted verbatim in the status column.
///
/// Lifecycle: `pending -> in_progress -> warning -> {done | timeout | cancelled}`.
/// Terminal statuses are never replaced once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum TxnStatus {
    Pending,
    InProgress,
    Warning,
    Done,
    Timeout,
    Cancelled,
}

impl TxnStatus {
    /// Parses a status cell, treating unknown or empty values as `Pending`.
    pub fn from_cell(cell: &str) -> Self {
        cell.parse().unwrap_or(TxnStatus::Pending)
    }

    /// Terminal statuses end a transaction exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnStatus::Done | TxnStatus::Timeout | TxnStatus::Cancelled)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    Channel,
    Tabular,
    Media,
}

// --- Inbound events ---

/// A raw GPS fix as delivered by the messaging platform's location message.
///
/// The `address` free-text carries the capture page's packed metadata
/// (`(txn=...|acc=...|ts=...)`) when the fix came through it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// Payload of one inbound webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Plain text message (commands, registration data, chatter).
    Text(String),
    /// Location message, possibly carrying packed metadata in the address.
    Location(LocationFix),
    /// Image message; bytes are fetched separately by message id.
    Image { message_id: MessageId },
}

/// One inbound event from the messaging channel, normalized across platforms.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: UserId,
    /// One-shot token for replying within the delivery window. Absent for
    /// replayed or synthetic events; the engine falls back to push.
    pub reply_token: Option<String>,
    pub kind: EventKind,
}

// --- Outbound messages ---

/// A quick-action button attached to an outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickAction {
    pub label: String,
    pub kind: QuickActionKind,
}

/// What tapping a quick-action button does on the user's device.
#[derive(Debug, Clone, PartialEq)]
pub enum QuickActionKind {
    /// Open the device camera.
    Camera,
    /// Open the camera roll picker.
    CameraRoll,
    /// Send a canned text message.
    Message(String),
    /// Open a URL (the GPS capture page).
    Uri(String),
}

/// An outbound message to be sent via reply or push.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub text: String,
    pub quick_actions: Vec<QuickAction>,
}

impl OutboundMessage {
    /// Plain text message with no buttons.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_actions: Vec::new(),
        }
    }

    /// Text message with quick-action buttons.
    pub fn with_actions(text: impl Into<String>, quick_actions: Vec<QuickAction>) -> Self {
        Self {
            text: text.into(),
            quick_actions,
        }
    }
}
