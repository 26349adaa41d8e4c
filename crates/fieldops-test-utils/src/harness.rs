// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end flow testing.
//!
//! `TestHarness` assembles the full bot stack over the in-memory fakes:
//! memory tabular backend, mock channel, mock media store, real row store
//! and engine. Provides `send_text()` / `send_location()` / `send_image()`
//! to drive complete conversations and inspect the replies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fieldops_config::model::{FieldopsConfig, FlowConfig};
use fieldops_core::{
    EventKind, FieldopsError, InboundEvent, LocationFix, MessageId, TransactionId, UserId,
};
use fieldops_engine::Engine;
use fieldops_store::{Employee, RowStore};

use crate::memory_backend::MemoryBackend;
use crate::mock_channel::MockChannel;
use crate::mock_media::MockMediaStore;

/// Builder for assembling a test environment with seeded data.
pub struct TestHarnessBuilder {
    employees: Vec<(String, String, String)>,
    sites: Vec<Vec<String>>,
    flow: Option<FlowConfig>,
    liff_id: Option<String>,
    offline_media: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            employees: Vec::new(),
            sites: Vec::new(),
            flow: None,
            liff_id: None,
            offline_media: false,
        }
    }

    /// Pre-register an employee so tests can skip the registration steps.
    pub fn with_employee(mut self, user_id: &str, name: &str, position: &str) -> Self {
        self.employees
            .push((user_id.to_string(), name.to_string(), position.to_string()));
        self
    }

    /// Seed one site row in the Locations tab.
    pub fn with_site(
        mut self,
        name: &str,
        group: &str,
        lat: f64,
        lon: f64,
        checkin_radius_m: f64,
        submission_radius_m: f64,
    ) -> Self {
        self.sites.push(vec![
            name.to_string(),
            group.to_string(),
            lat.to_string(),
            lon.to_string(),
            checkin_radius_m.to_string(),
            submission_radius_m.to_string(),
        ]);
        self
    }

    /// Override the flow timing/validation settings.
    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Configure a capture-page id so location requests carry the button.
    pub fn with_liff_id(mut self, liff_id: &str) -> Self {
        self.liff_id = Some(liff_id.to_string());
        self
    }

    /// Start with the media store unauthorized.
    pub fn with_offline_media(mut self) -> Self {
        self.offline_media = true;
        self
    }

    /// Build the harness, seeding the backend and wiring the engine.
    pub async fn build(self) -> Result<TestHarness, FieldopsError> {
        let mut config = FieldopsConfig::default();
        config.line.liff_id = self.liff_id;
        // Keep retries cheap so failure-injection tests stay fast.
        config.sheets.execute_timeout_s = 2;
        config.sheets.quick_timeout_s = 1;
        config.sheets.max_attempts = 2;
        config.sheets.backoff_base_s = 0.01;
        if let Some(flow) = self.flow {
            config.flow = flow;
        }

        let backend = Arc::new(MemoryBackend::new());
        if !self.sites.is_empty() {
            let mut rows = vec![vec![
                "name".to_string(),
                "group".to_string(),
                "latitude".to_string(),
                "longitude".to_string(),
                "checkin_radius_m".to_string(),
                "submission_radius_m".to_string(),
            ]];
            rows.extend(self.sites);
            backend.seed_rows(&config.sheets.locations_sheet, rows);
        }

        let store = Arc::new(RowStore::new(backend.clone(), &config.sheets));
        for (user_id, name, position) in &self.employees {
            store
                .append_employee(&Employee::new(
                    UserId(user_id.clone()),
                    name.clone(),
                    position.clone(),
                ))
                .await?;
        }

        let channel = Arc::new(MockChannel::new());
        let media = Arc::new(if self.offline_media {
            MockMediaStore::offline()
        } else {
            MockMediaStore::new()
        });
        let engine = Arc::new(Engine::new(
            store.clone(),
            channel.clone(),
            media.clone(),
            &config,
        ));

        Ok(TestHarness {
            backend,
            store,
            channel,
            media,
            engine,
            config,
            token_seq: AtomicU64::new(0),
        })
    }
}

/// A complete bot environment over in-memory fakes.
pub struct TestHarness {
    /// The tabular backend, for raw row assertions and failure injection.
    pub backend: Arc<MemoryBackend>,
    /// The row store shared with the engine.
    pub store: Arc<RowStore>,
    /// The mock channel capturing every outbound message.
    pub channel: Arc<MockChannel>,
    /// The mock media store capturing uploads.
    pub media: Arc<MockMediaStore>,
    /// The engine under test.
    pub engine: Arc<Engine>,
    /// The configuration the engine was built with.
    pub config: FieldopsConfig,
    token_seq: AtomicU64,
}

impl TestHarness {
    /// Create a new builder for configuring the harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Drive one text event and return the reply texts it produced.
    pub async fn send_text(&self, user: &str, text: &str) -> Vec<String> {
        self.dispatch(user, EventKind::Text(text.to_string())).await
    }

    /// Drive one location event with an arbitrary address field.
    pub async fn send_location(
        &self,
        user: &str,
        latitude: f64,
        longitude: f64,
        address: Option<String>,
    ) -> Vec<String> {
        self.dispatch(
            user,
            EventKind::Location(LocationFix {
                latitude,
                longitude,
                address,
            }),
        )
        .await
    }

    /// Share a fresh, accurate fix carrying the user's current transaction
    /// id, as the capture page would send it.
    pub async fn share_location(
        &self,
        user: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<String>, FieldopsError> {
        let txn = self
            .current_txn(user)
            .await?
            .ok_or_else(|| FieldopsError::Internal(format!("no open transaction for {user}")))?;
        Ok(self
            .send_location(
                user,
                latitude,
                longitude,
                Some(packed_address(&txn, 5.0, 0)),
            )
            .await)
    }

    /// Stage raw image bytes on the channel and drive one image event.
    pub async fn send_image(&self, user: &str, bytes: Vec<u8>) -> Vec<String> {
        let message_id = MessageId(format!("m-{}", self.token_seq.fetch_add(1, Ordering::Relaxed)));
        self.channel.stage_content(&message_id, bytes).await;
        self.dispatch(user, EventKind::Image { message_id }).await
    }

    /// The user's current transaction id, straight from the employee row.
    pub async fn current_txn(&self, user: &str) -> Result<Option<TransactionId>, FieldopsError> {
        Ok(self
            .store
            .find_employee(&UserId(user.to_string()))
            .await?
            .and_then(|e| e.transaction_id))
    }

    async fn dispatch(&self, user: &str, kind: EventKind) -> Vec<String> {
        let token = format!("tok-{}", self.token_seq.fetch_add(1, Ordering::Relaxed));
        let before = self.channel.sent_count().await;
        self.engine
            .handle_event(InboundEvent {
                user_id: UserId(user.to_string()),
                reply_token: Some(token),
                kind,
            })
            .await;
        self.channel.sent_messages().await[before..]
            .iter()
            .flat_map(|s| s.messages.iter().map(|m| m.text.clone()))
            .collect()
    }
}

/// The capture page's packed address block: `(txn=…|acc=…|ts=…)` with a
/// timestamp `age_s` seconds in the past.
pub fn packed_address(txn: &TransactionId, accuracy_m: f64, age_s: i64) -> String {
    let ts = chrono::Utc::now().timestamp_millis() - age_s * 1000;
    format!("Field Office (txn={txn}|acc={accuracy_m}|ts={ts})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::flat_jpeg;

    #[tokio::test]
    async fn harness_runs_a_complete_checkin() {
        let harness = TestHarness::builder()
            .with_employee("U1", "Ann", "Technician")
            .with_site("Depot", "north", 13.7563, 100.5018, 100.0, 150.0)
            .build()
            .await
            .unwrap();

        harness.send_text("U1", "check in").await;
        let replies = harness.share_location("U1", 13.7563, 100.5018).await.unwrap();
        assert!(replies[0].contains("Depot"));

        for _ in 0..2 {
            let replies = harness.send_image("U1", flat_jpeg(64, 64, 90)).await;
            assert!(replies[0].contains("Photo saved"));
        }
        let replies = harness.send_image("U1", flat_jpeg(64, 64, 90)).await;
        assert!(replies[0].contains("now closed"));
    }

    #[tokio::test]
    async fn harness_seeds_employees_and_sites() {
        let harness = TestHarness::builder()
            .with_employee("U1", "Ann", "Technician")
            .with_site("Depot", "north", 1.0, 2.0, 100.0, 150.0)
            .build()
            .await
            .unwrap();

        assert_eq!(harness.backend.row_count(&harness.config.sheets.employees_sheet), 1);
        let sites = harness.store.load_sites().await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "Depot");
    }
}
