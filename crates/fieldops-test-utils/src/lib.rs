// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Fieldops integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MemoryBackend`] - In-memory tabular store with fault injection
//! - [`MockChannel`] - Mock messaging channel with event injection and
//!   outbound capture
//! - [`MockMediaStore`] - Mock media store minting fake view URLs
//! - [`TestHarness`] - Fully wired engine over the mock adapters

pub mod harness;
pub mod images;
pub mod memory_backend;
pub mod mock_channel;
pub mod mock_media;

pub use harness::{packed_address, TestHarness, TestHarnessBuilder};
pub use memory_backend::MemoryBackend;
pub use mock_channel::{Delivery, MockChannel, SentMessage};
pub use mock_media::{MockMediaStore, UploadedFile};
