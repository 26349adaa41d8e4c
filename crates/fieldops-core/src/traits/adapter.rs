// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all external-seam adapters implement.

use async_trait::async_trait;

use crate::error::FieldopsError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Fieldops adapters.
///
/// Every adapter (channel, tabular store, media store) implements this
/// trait, which provides identity, health check, and shutdown.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the kind of adapter (channel, tabular, media).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, FieldopsError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), FieldopsError>;
}
