// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation engine for the Fieldops bot.
//!
//! This crate owns everything between an inbound channel event and a row
//! mutation:
//! - [`Engine`]: the per-event orchestrator (text, location, image)
//! - [`FlowMachine`]: transaction lifecycle (start, accept location,
//!   finalize) with the row-before-employee write ordering
//! - [`ImageIntake`]: prepare/upload/slot-assignment pipeline with the
//!   submission duplicate audit
//! - [`TimeoutSweeper`]: the inline timeout check and the background sweep
//! - [`TxnLocks`]: per-transaction mutual exclusion shared by all of the
//!   above
//!
//! The engine speaks to the outside world only through the
//! [`fieldops_core`] adapter traits, so every piece is testable against
//! the in-memory fakes.

pub mod commands;
pub mod engine;
pub mod intake;
pub mod locks;
pub mod machine;
pub mod messages;
pub mod meta;
mod metrics;
pub mod shutdown;
pub mod sweeper;

pub use commands::Command;
pub use engine::Engine;
pub use intake::{ImageIntake, IntakeError, IntakeOutcome};
pub use locks::TxnLocks;
pub use machine::{FinalizeOutcome, FlowMachine};
pub use meta::LocationMeta;
pub use sweeper::{TimeoutSweeper, TimeoutVerdict};
