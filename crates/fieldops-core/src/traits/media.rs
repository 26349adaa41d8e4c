// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store trait for evidence image uploads.

use async_trait::async_trait;

use crate::error::FieldopsError;
use crate::traits::adapter::Adapter;

/// Adapter for the external object store holding uploaded evidence images.
#[async_trait]
pub trait MediaStore: Adapter {
    /// Whether the store is configured and authorized. When false the engine
    /// degrades softly: the user is told storage is not connected and no
    /// upload is attempted.
    fn is_ready(&self) -> bool;

    /// Uploads encoded JPEG bytes under the given file name and returns a
    /// stable, shareable view URL.
    async fn upload_jpeg(&self, file_name: &str, bytes: Vec<u8>)
    -> Result<String, FieldopsError>;
}
