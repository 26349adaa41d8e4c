// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Sheets values-API client implementing [`TabularBackend`].
//!
//! Single-shot calls only: timeouts, retries, and caching are owned by the
//! row store one layer up. Writes use `valueInputOption=RAW` so cell text
//! lands exactly as sent, without spreadsheet-side parsing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fieldops_config::model::SheetsConfig;
use fieldops_core::error::FieldopsError;
use fieldops_core::traits::{Adapter, TabularBackend};
use fieldops_core::types::{AdapterType, HealthStatus};

/// HTTP client for the Sheets values API.
///
/// Ranges are addressed as `{tab}!{A1-range}`; tab names go into the URL
/// as-is, so they must be URL-safe.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    /// Creates a new Sheets client.
    ///
    /// Requires `config.spreadsheet_id` and `config.access_token` to be set.
    pub fn new(config: &SheetsConfig) -> Result<Self, FieldopsError> {
        let spreadsheet_id = config.spreadsheet_id.as_deref().ok_or_else(|| {
            FieldopsError::Config("sheets.spreadsheet_id is required to serve".into())
        })?;
        let token = config.access_token.as_deref().ok_or_else(|| {
            FieldopsError::Config("sheets.access_token is required to serve".into())
        })?;

        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {token}");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&bearer).map_err(|e| {
                FieldopsError::Config(format!("invalid sheets access token header value: {e}"))
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.execute_timeout_s))
            .build()
            .map_err(|e| FieldopsError::Store {
                source: Box::new(e),
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            spreadsheet_id: spreadsheet_id.to_string(),
        })
    }

    fn values_url(&self, sheet: &str, range: &str) -> String {
        format!(
            "{}/{}/values/{}!{}",
            self.api_base, self.spreadsheet_id, sheet, range
        )
    }
}

#[async_trait]
impl Adapter for SheetsClient {
    fn name(&self) -> &str {
        "sheets"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Tabular
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        let url = format!("{}/{}", self.api_base, self.spreadsheet_id);
        let response = self
            .http
            .get(&url)
            .query(&[("fields", "spreadsheetId")])
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(r) => Ok(HealthStatus::Unhealthy(format!(
                "spreadsheet fetch returned {}",
                r.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Sheets API unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        debug!("Sheets client shutting down");
        Ok(())
    }
}

#[async_trait]
impl TabularBackend for SheetsClient {
    async fn read_range(
        &self,
        sheet: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, FieldopsError> {
        let response = self
            .http
            .get(self.values_url(sheet, range))
            .send()
            .await
            .map_err(store_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldopsError::Store {
                source: format!("Sheets read {sheet}!{range} returned {status}: {body}").into(),
            });
        }

        let payload: ValueRange = response.json().await.map_err(store_error)?;
        let rows = payload
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        Ok(rows)
    }

    async fn append_row(
        &self,
        sheet: &str,
        range: &str,
        row: Vec<String>,
    ) -> Result<(), FieldopsError> {
        let url = format!("{}:append", self.values_url(sheet, range));
        let response = self
            .http
            .post(&url)
            .query(&[("valueInputOption", "RAW")])
            .json(&ValueRangeBody { values: vec![row] })
            .send()
            .await
            .map_err(store_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldopsError::Store {
                source: format!("Sheets append {sheet}!{range} returned {status}: {body}").into(),
            });
        }
        Ok(())
    }

    async fn update_range(
        &self,
        sheet: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), FieldopsError> {
        let response = self
            .http
            .put(self.values_url(sheet, range))
            .query(&[("valueInputOption", "RAW")])
            .json(&ValueRangeBody { values: rows })
            .send()
            .await
            .map_err(store_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldopsError::Store {
                source: format!("Sheets update {sheet}!{range} returned {status}: {body}").into(),
            });
        }
        Ok(())
    }
}

fn store_error(e: reqwest::Error) -> FieldopsError {
    FieldopsError::Store {
        source: Box::new(e),
    }
}

/// Formatted cells arrive as JSON strings; anything else (an unformatted
/// number, a bool) is rendered to its literal text.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// --- Sheets values wire format ---

#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Absent entirely when the range holds no data.
    values: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody {
    values: Vec<Vec<String>>,
}
