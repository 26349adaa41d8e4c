// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Fieldops field-operations bot.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Fieldops workspace. The engine crate
//! depends only on the traits defined here; production adapters and test
//! fakes both implement them.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::FieldopsError;
pub use types::{
    EmployeeState, EventKind, FlowKind, HealthStatus, InboundEvent, LocationFix, MessageId,
    OutboundMessage, QuickAction, QuickActionKind, TransactionId, TxnStatus, UserId,
};

// Re-export all adapter traits at crate root.
pub use traits::{Adapter, MediaStore, MessagingChannel, TabularBackend};
