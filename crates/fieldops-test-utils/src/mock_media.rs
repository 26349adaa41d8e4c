// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock media store for deterministic testing.
//!
//! `MockMediaStore` implements `MediaStore`, minting stable fake view URLs
//! and capturing every upload. It can be constructed offline (not ready)
//! to exercise the engine's degraded no-storage path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use fieldops_core::types::{AdapterType, HealthStatus};
use fieldops_core::{Adapter, FieldopsError, MediaStore};

/// One captured upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub url: String,
}

/// A mock media store that records uploads and mints fake view URLs.
pub struct MockMediaStore {
    ready: AtomicBool,
    uploads: Arc<Mutex<Vec<UploadedFile>>>,
    fail_uploads: AtomicUsize,
}

impl MockMediaStore {
    /// Create a ready store that accepts uploads.
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail_uploads: AtomicUsize::new(0),
        }
    }

    /// Create a store that reports itself unconfigured.
    pub fn offline() -> Self {
        let store = Self::new();
        store.ready.store(false, Ordering::SeqCst);
        store
    }

    /// Arm the next `n` uploads to fail with a media error.
    pub fn fail_next_uploads(&self, n: usize) {
        self.fail_uploads.store(n, Ordering::SeqCst);
    }

    /// All captured uploads, in order.
    pub async fn uploads(&self) -> Vec<UploadedFile> {
        self.uploads.lock().await.clone()
    }

    /// Number of captured uploads.
    pub async fn upload_count(&self) -> usize {
        self.uploads.lock().await.len()
    }
}

impl Default for MockMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockMediaStore {
    fn name(&self) -> &str {
        "mock-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Media
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        Ok(())
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn upload_jpeg(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, FieldopsError> {
        if self
            .fail_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FieldopsError::Media {
                message: "injected upload failure".into(),
                source: None,
            });
        }
        let url = format!("https://media.invalid/view/{file_name}");
        self.uploads.lock().await.push(UploadedFile {
            file_name: file_name.to_string(),
            bytes,
            url: url.clone(),
        });
        Ok(url)
    }
}
