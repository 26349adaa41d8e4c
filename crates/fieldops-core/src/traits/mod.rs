// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Fieldops external seams.
//!
//! All adapters extend the [`Adapter`] base trait and use `#[async_trait]`
//! for dynamic dispatch compatibility. The engine only ever sees these
//! traits; production implementations live in `fieldops-line` and
//! `fieldops-google`, test fakes in `fieldops-test-utils`.

pub mod adapter;
pub mod channel;
pub mod media;
pub mod tabular;

// Re-export all traits at the traits module level for convenience.
pub use adapter::Adapter;
pub use channel::MessagingChannel;
pub use media::MediaStore;
pub use tabular::TabularBackend;
