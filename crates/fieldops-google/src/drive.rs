// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Drive media store implementing [`MediaStore`].
//!
//! Evidence images are created with one `multipart/related` upload into the
//! configured folder, granted an anyone-with-link reader permission on a
//! best-effort basis, and referenced by their `webViewLink`. Credentials are
//! optional: without them the store reports not-ready and the engine
//! degrades softly instead of failing flows.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use fieldops_config::model::DriveConfig;
use fieldops_core::error::FieldopsError;
use fieldops_core::traits::{Adapter, MediaStore};
use fieldops_core::types::{AdapterType, HealthStatus};

/// HTTP client for Drive v3 uploads and permission grants.
#[derive(Debug, Clone)]
pub struct DriveStore {
    http: reqwest::Client,
    upload_base: String,
    api_base: String,
    folder_id: Option<String>,
    has_token: bool,
}

impl DriveStore {
    /// Creates a new Drive store.
    ///
    /// Never fails on missing credentials; those surface through
    /// [`MediaStore::is_ready`] so the engine can degrade softly.
    pub fn new(config: &DriveConfig) -> Result<Self, FieldopsError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.access_token.as_deref() {
            let bearer = format!("Bearer {token}");
            headers.insert(
                "authorization",
                HeaderValue::from_str(&bearer).map_err(|e| {
                    FieldopsError::Config(format!("invalid drive access token header value: {e}"))
                })?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.execute_timeout_s))
            .build()
            .map_err(|e| FieldopsError::Media {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            upload_base: config.upload_base.clone(),
            api_base: config.api_base.clone(),
            folder_id: config.folder_id.clone(),
            has_token: config.access_token.is_some(),
        })
    }

    /// Grants the anyone-with-link reader permission. Best effort: a failure
    /// leaves the file private but the upload still counts.
    async fn share_publicly(&self, file_id: &str) {
        let url = format!("{}/files/{file_id}/permissions", self.api_base);
        let result = self
            .http
            .post(&url)
            .query(&[("fields", "id")])
            .json(&serde_json::json!({"type": "anyone", "role": "reader"}))
            .send()
            .await;

        match result {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => {
                warn!(file_id, status = %r.status(), "permission grant failed, link may not be public");
            }
            Err(e) => {
                warn!(file_id, error = %e, "permission grant failed, link may not be public");
            }
        }
    }
}

#[async_trait]
impl Adapter for DriveStore {
    fn name(&self) -> &str {
        "drive"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Media
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        let Some(folder) = self.folder_id.as_deref() else {
            return Ok(HealthStatus::Degraded(
                "drive credentials not configured".into(),
            ));
        };
        if !self.has_token {
            return Ok(HealthStatus::Degraded(
                "drive credentials not configured".into(),
            ));
        }

        let url = format!("{}/files/{folder}", self.api_base);
        let response = self.http.get(&url).query(&[("fields", "id")]).send().await;
        match response {
            Ok(r) if r.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(r) => Ok(HealthStatus::Unhealthy(format!(
                "drive folder fetch returned {}",
                r.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Drive API unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        debug!("Drive store shutting down");
        Ok(())
    }
}

#[async_trait]
impl MediaStore for DriveStore {
    fn is_ready(&self) -> bool {
        self.has_token && self.folder_id.is_some()
    }

    async fn upload_jpeg(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, FieldopsError> {
        let Some(folder) = self.folder_id.as_deref() else {
            return Err(FieldopsError::Media {
                message: "drive folder is not configured".into(),
                source: None,
            });
        };
        if !self.has_token {
            return Err(FieldopsError::Media {
                message: "drive access token is not configured".into(),
                source: None,
            });
        }

        let metadata = serde_json::json!({
            "name": file_name,
            "parents": [folder],
        });

        // Drive's multipart endpoint wants multipart/related, which reqwest's
        // form support does not produce; the body is small enough to build by
        // hand.
        let boundary = format!("fieldops-{}", Uuid::new_v4());
        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let url = format!("{}/files", self.upload_base);
        let response = self
            .http
            .post(&url)
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
            .header(
                "content-type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| FieldopsError::Media {
                message: format!("drive upload failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldopsError::Media {
                message: format!("drive upload returned {status}: {body}"),
                source: None,
            });
        }

        let file: DriveFile = response.json().await.map_err(|e| FieldopsError::Media {
            message: format!("failed to parse drive upload response: {e}"),
            source: Some(Box::new(e)),
        })?;

        self.share_publicly(&file.id).await;

        debug!(file_id = %file.id, file_name, "uploaded evidence image");
        Ok(file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id)))
    }
}

// --- Drive wire format ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(base_url: &str) -> DriveStore {
        let config = DriveConfig {
            folder_id: Some("folder-1".into()),
            access_token: Some("test-token".into()),
            upload_base: base_url.to_string(),
            api_base: base_url.to_string(),
            execute_timeout_s: 5,
        };
        DriveStore::new(&config).unwrap()
    }

    #[test]
    fn readiness_requires_both_token_and_folder() {
        let store = DriveStore::new(&DriveConfig::default()).unwrap();
        assert!(!store.is_ready());

        let store = DriveStore::new(&DriveConfig {
            folder_id: Some("folder-1".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!store.is_ready());

        assert!(test_store("http://localhost").is_ready());
    }

    #[tokio::test]
    async fn uploads_multipart_and_returns_the_view_link() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .and(query_param("uploadType", "multipart"))
            .and(body_string_contains("\"name\":\"checkin_image_t1.jpg\""))
            .and(body_string_contains("\"parents\":[\"folder-1\"]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "f1",
                "webViewLink": "https://drive.google.com/file/d/f1/view?usp=drivesdk"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/f1/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "p1"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let url = store
            .upload_jpeg("checkin_image_t1.jpg", vec![0xFF, 0xD8, 0xFF, 0xD9])
            .await
            .unwrap();
        assert_eq!(url, "https://drive.google.com/file/d/f1/view?usp=drivesdk");
    }

    #[tokio::test]
    async fn view_link_falls_back_to_the_file_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "f2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/f2/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "p"})))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let url = store.upload_jpeg("a.jpg", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "https://drive.google.com/file/d/f2/view");
    }

    #[tokio::test]
    async fn a_failed_permission_grant_does_not_fail_the_upload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "f3"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/f3/permissions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let url = store.upload_jpeg("b.jpg", vec![1]).await.unwrap();
        assert!(url.contains("/file/d/f3/"));
    }

    #[tokio::test]
    async fn upload_failure_is_a_media_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let err = store.upload_jpeg("c.jpg", vec![1]).await.unwrap_err();
        assert!(matches!(err, FieldopsError::Media { .. }));
    }

    #[tokio::test]
    async fn unconfigured_store_refuses_uploads() {
        let store = DriveStore::new(&DriveConfig::default()).unwrap();
        let err = store.upload_jpeg("d.jpg", vec![1]).await.unwrap_err();
        assert!(matches!(err, FieldopsError::Media { .. }));
    }

    #[tokio::test]
    async fn health_is_degraded_without_credentials() {
        let store = DriveStore::new(&DriveConfig::default()).unwrap();
        match store.health_check().await.unwrap() {
            HealthStatus::Degraded(reason) => assert!(reason.contains("not configured")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[test]
    fn adapter_metadata() {
        let store = test_store("http://localhost");
        assert_eq!(store.name(), "drive");
        assert_eq!(store.adapter_type(), AdapterType::Media);
    }
}
