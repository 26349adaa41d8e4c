// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow orchestrator: one state-dispatched handler per event kind.
//!
//! Every inbound event runs the same prologue (employee lookup, inline
//! timeout check) and then hands off to the text, location, or image
//! handler. Replies go out on the event's one-shot reply token when one
//! is still live, with a push fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fieldops_config::model::FieldopsConfig;
use fieldops_core::{
    EventKind, FlowKind, InboundEvent, LocationFix, MediaStore, MessageId, MessagingChannel,
    OutboundMessage, TxnStatus, UserId,
};
use fieldops_geo::{match_site, NoMatchPolicy};
use fieldops_store::{Employee, RowStore};

use crate::commands::Command;
use crate::intake::{ImageIntake, IntakeError};
use crate::locks::TxnLocks;
use crate::machine::FlowMachine;
use crate::messages;
use crate::meta::LocationMeta;
use crate::metrics;
use crate::sweeper::{TimeoutSweeper, TimeoutVerdict};

pub struct Engine {
    store: Arc<RowStore>,
    channel: Arc<dyn MessagingChannel>,
    machine: Arc<FlowMachine>,
    intake: ImageIntake,
    sweeper: Arc<TimeoutSweeper>,
    liff_id: Option<String>,
    max_accuracy_m: f64,
    max_location_age: Duration,
    no_match_policy: NoMatchPolicy,
}

impl Engine {
    pub fn new(
        store: Arc<RowStore>,
        channel: Arc<dyn MessagingChannel>,
        media: Arc<dyn MediaStore>,
        config: &FieldopsConfig,
    ) -> Self {
        let locks = Arc::new(TxnLocks::new());
        let machine = Arc::new(FlowMachine::new(store.clone(), locks.clone()));
        let sweeper = Arc::new(TimeoutSweeper::new(
            store.clone(),
            machine.clone(),
            locks.clone(),
            channel.clone(),
            &config.flow,
        ));
        let intake = ImageIntake::new(store.clone(), media, locks, config.image.clone());
        Self {
            store,
            channel,
            machine,
            intake,
            sweeper,
            liff_id: config.line.liff_id.clone(),
            max_accuracy_m: config.flow.max_gps_accuracy_m,
            max_location_age: Duration::from_secs(config.flow.max_location_age_s),
            no_match_policy: NoMatchPolicy::from_config_value(&config.flow.no_match_policy),
        }
    }

    /// The sweeper sharing this engine's store, locks, and channel, for
    /// the caller to spawn alongside the event loop.
    pub fn sweeper(&self) -> Arc<TimeoutSweeper> {
        self.sweeper.clone()
    }

    /// Consume channel events until cancelled, one task per event so a
    /// slow upload never blocks the queue.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("engine running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("engine stopped");
                    return;
                }
                event = self.channel.receive() => match event {
                    Ok(event) => {
                        let engine = self.clone();
                        tokio::spawn(async move { engine.handle_event(event).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "event intake failed");
                        // Keep a broken channel from spinning the loop hot.
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        }
    }

    /// Dispatch one inbound event through the full prologue and handlers.
    pub async fn handle_event(&self, event: InboundEvent) {
        let user = event.user_id.clone();
        let mut token = event.reply_token;

        let employee = match self.store.find_employee(&user).await {
            Ok(employee) => employee,
            Err(e) => {
                warn!(user_id = %user, error = %e, "employee lookup failed");
                self.deliver(token.as_deref(), &user, messages::sheets_slow())
                    .await;
                return;
            }
        };

        if let Some(employee) = &employee {
            match self.sweeper.check_on_event(employee, token.as_deref()).await {
                TimeoutVerdict::Clear => {}
                // The warning consumed the reply token; later replies push.
                TimeoutVerdict::Warned => token = None,
                TimeoutVerdict::TimedOut => return,
            }
        }

        let token = token.as_deref();
        match event.kind {
            EventKind::Text(text) => {
                metrics::record_event("text");
                self.handle_text(employee, &user, &text, token).await;
            }
            EventKind::Location(fix) => {
                metrics::record_event("location");
                self.handle_location(employee, &user, &fix, token).await;
            }
            EventKind::Image { message_id } => {
                metrics::record_event("image");
                self.handle_image(employee, &user, &message_id, token).await;
            }
        }
    }

    // --- text ---

    async fn handle_text(
        &self,
        employee: Option<Employee>,
        user: &UserId,
        text: &str,
        token: Option<&str>,
    ) {
        let finishable = employee.as_ref().and_then(|e| {
            if !e.state.expects_images() {
                return None;
            }
            Some((e.state.flow()?, e.transaction_id.clone()?))
        });

        match Command::parse(text) {
            Some(Command::Register) => {
                let reply = if employee.is_some() {
                    messages::already_registered()
                } else {
                    messages::registration_prompt()
                };
                self.deliver(token, user, reply).await;
            }
            Some(Command::StartCheckin) => {
                self.start_flow(employee, user, FlowKind::Checkin, token).await;
            }
            Some(Command::StartSubmission) => {
                self.start_flow(employee, user, FlowKind::Submission, token).await;
            }
            Some(Command::Cancel) => {
                self.cancel(employee, user, token).await;
            }
            Some(Command::Finish) if finishable.is_some() => {
                if let Some((flow, txn)) = finishable {
                    let outcome = self
                        .machine
                        .finalize(flow, user, &txn, TxnStatus::Done)
                        .await;
                    let images = outcome.images.unwrap_or(0);
                    let summary = match flow {
                        FlowKind::Checkin => messages::checkin_summary(images),
                        FlowKind::Submission => messages::submission_summary(images),
                    };
                    self.deliver(token, user, summary).await;
                }
            }
            // A finish synonym outside the image step is just text.
            _ => self.handle_plain_text(employee, user, text, token).await,
        }
    }

    async fn start_flow(
        &self,
        employee: Option<Employee>,
        user: &UserId,
        flow: FlowKind,
        token: Option<&str>,
    ) {
        let Some(employee) = employee else {
            self.deliver(token, user, messages::not_registered()).await;
            return;
        };
        if let Some(open) = employee.state.flow() {
            self.deliver(token, user, messages::flow_already_open(open))
                .await;
            return;
        }
        match self.machine.start_flow(user, flow).await {
            Ok(txn) => {
                self.deliver(
                    token,
                    user,
                    messages::location_request(flow, &txn, self.liff_id.as_deref()),
                )
                .await;
            }
            Err(e) => {
                warn!(user_id = %user, flow = %flow, error = %e, "flow start failed");
                self.deliver(token, user, messages::sheets_slow()).await;
            }
        }
    }

    async fn cancel(&self, employee: Option<Employee>, user: &UserId, token: Option<&str>) {
        let open = employee
            .as_ref()
            .and_then(|e| Some((e.state.flow()?, e.transaction_id.clone()?)));
        let Some((flow, txn)) = open else {
            self.deliver(token, user, messages::nothing_in_progress())
                .await;
            return;
        };
        self.machine
            .finalize(flow, user, &txn, TxnStatus::Cancelled)
            .await;
        self.deliver(token, user, messages::cancelled(flow)).await;
    }

    async fn handle_plain_text(
        &self,
        employee: Option<Employee>,
        user: &UserId,
        text: &str,
        token: Option<&str>,
    ) {
        let Some(employee) = employee else {
            self.register_from_text(user, text, token).await;
            return;
        };
        if employee.state.expects_images() {
            if let Some(flow) = employee.state.flow() {
                self.deliver(token, user, messages::images_prompt(flow)).await;
                return;
            }
        }
        self.deliver(token, user, messages::help_text()).await;
    }

    /// Unregistered text: `Name, Position` registers, anything else hints.
    async fn register_from_text(&self, user: &UserId, text: &str, token: Option<&str>) {
        let Some((name, position)) = text.split_once(',') else {
            self.deliver(token, user, messages::not_registered()).await;
            return;
        };
        let (name, position) = (name.trim(), position.trim());
        if name.is_empty() || position.is_empty() {
            self.deliver(token, user, messages::registration_malformed())
                .await;
            return;
        }
        let employee = Employee::new(user.clone(), name.to_string(), position.to_string());
        match self.store.append_employee(&employee).await {
            Ok(()) => {
                info!(user_id = %user, name, position, "employee registered");
                self.deliver(token, user, messages::registration_done()).await;
            }
            Err(e) => {
                warn!(user_id = %user, error = %e, "registration append failed");
                self.deliver(token, user, messages::sheets_slow()).await;
            }
        }
    }

    // --- location ---

    async fn handle_location(
        &self,
        employee: Option<Employee>,
        user: &UserId,
        fix: &LocationFix,
        token: Option<&str>,
    ) {
        let Some(employee) = employee else {
            self.deliver(token, user, messages::not_registered()).await;
            return;
        };

        // Validation order: txn correlation, then accuracy, then age.
        let meta = match fix.address.as_deref().and_then(LocationMeta::parse) {
            Some(meta) if employee.transaction_id.as_ref() == Some(&meta.txn) => meta,
            other => {
                debug!(
                    user_id = %user,
                    parsed = other.is_some(),
                    "location metadata missing or for a different transaction"
                );
                self.deliver(token, user, messages::location_meta_missing())
                    .await;
                return;
            }
        };
        if meta.accuracy_m > self.max_accuracy_m {
            self.deliver(
                token,
                user,
                messages::accuracy_too_low(meta.accuracy_m, self.max_accuracy_m),
            )
            .await;
            return;
        }
        if !meta.is_fresh(Utc::now().timestamp_millis(), self.max_location_age) {
            self.deliver(token, user, messages::location_stale()).await;
            return;
        }

        if !employee.state.expects_location() {
            self.deliver(token, user, messages::start_flow_first()).await;
            return;
        }
        let Some(flow) = employee.state.flow() else {
            self.deliver(token, user, messages::start_flow_first()).await;
            return;
        };

        let sites = match self.store.load_sites().await {
            Ok(sites) => sites,
            Err(e) => {
                warn!(user_id = %user, error = %e, "site list unavailable");
                self.deliver(token, user, messages::sheets_slow()).await;
                return;
            }
        };

        let matched = match_site(
            fix.latitude,
            fix.longitude,
            flow,
            &sites,
            self.no_match_policy,
        );
        if matched.site_name.is_none() {
            // Only the reject policy leaves the name empty.
            self.deliver(
                token,
                user,
                messages::outside_radius(flow, matched.distance_m.unwrap_or(0.0)),
            )
            .await;
            return;
        }

        match self
            .machine
            .accept_location(&employee, flow, &meta.txn, &matched, fix.latitude, fix.longitude)
            .await
        {
            Ok(_) => {
                self.deliver(
                    token,
                    user,
                    messages::location_accepted(
                        flow,
                        matched.site_name.as_deref(),
                        matched.distance_m.unwrap_or(0.0),
                    ),
                )
                .await;
            }
            Err(e) => {
                warn!(user_id = %user, txn_id = %meta.txn, error = %e, "location persist failed");
                self.deliver(token, user, messages::sheets_slow()).await;
            }
        }
    }

    // --- image ---

    async fn handle_image(
        &self,
        employee: Option<Employee>,
        user: &UserId,
        message_id: &MessageId,
        token: Option<&str>,
    ) {
        let Some(employee) = employee else {
            self.deliver(token, user, messages::not_registered()).await;
            return;
        };
        let open = match (employee.state.flow(), employee.transaction_id.clone()) {
            (Some(flow), Some(txn)) if employee.state.expects_images() => Some((flow, txn)),
            _ => None,
        };
        let Some((flow, txn)) = open else {
            self.deliver(token, user, messages::not_at_image_step()).await;
            return;
        };

        let raw = match self.channel.download_content(message_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(user_id = %user, message_id = %message_id, error = %e, "content download failed");
                self.deliver(token, user, messages::download_failed()).await;
                return;
            }
        };

        match self.intake.ingest(&txn, &raw, flow).await {
            Ok(outcome) => {
                if let Some(note) = &outcome.duplicate_note {
                    // Audit trail only; the user is never told.
                    info!(user_id = %user, txn_id = %txn, note, "duplicate submission image");
                }
                let reply = if outcome.filled >= 3 {
                    match flow {
                        FlowKind::Checkin => {
                            self.machine.finalize(flow, user, &txn, TxnStatus::Done).await;
                            messages::checkin_complete_auto()
                        }
                        FlowKind::Submission => messages::submission_images_full(),
                    }
                } else {
                    messages::image_saved(flow, 3 - outcome.filled)
                };
                self.deliver(token, user, reply).await;
            }
            Err(e) => {
                warn!(user_id = %user, txn_id = %txn, flow = %flow, error = %e, "image ingest failed");
                let reply = match &e {
                    IntakeError::Prepare(_) => messages::prepare_failed(),
                    IntakeError::StorageNotConnected => messages::storage_not_connected(),
                    IntakeError::Upload(_) => messages::upload_failed(),
                    IntakeError::RowMissing => messages::restart_flow(flow),
                    IntakeError::RowWrite(_) => messages::row_write_failed(),
                };
                self.deliver(token, user, reply).await;
            }
        }
    }

    // --- delivery ---

    /// Reply on the one-shot token when present, push otherwise or when
    /// the reply window has already closed.
    async fn deliver(&self, token: Option<&str>, user: &UserId, message: OutboundMessage) {
        if let Some(token) = token {
            match self.channel.reply(token, vec![message.clone()]).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(user_id = %user, error = %e, "reply failed, falling back to push");
                }
            }
        }
        if let Err(e) = self.channel.push(user, vec![message]).await {
            warn!(user_id = %user, error = %e, "push failed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::{EmployeeState, TransactionId};
    use fieldops_test_utils::images::flat_jpeg;
    use fieldops_test_utils::{MemoryBackend, MockChannel, MockMediaStore};

    struct Rig {
        backend: Arc<MemoryBackend>,
        store: Arc<RowStore>,
        channel: Arc<MockChannel>,
        engine: Arc<Engine>,
    }

    fn rig() -> Rig {
        let mut config = FieldopsConfig::default();
        config.line.liff_id = Some("liff-123".to_string());
        config.sheets.execute_timeout_s = 2;
        config.sheets.quick_timeout_s = 1;
        config.sheets.max_attempts = 2;
        config.sheets.backoff_base_s = 0.01;

        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(RowStore::new(backend.clone(), &config.sheets));
        let channel = Arc::new(MockChannel::new());
        let media = Arc::new(MockMediaStore::new());
        let engine = Arc::new(Engine::new(
            store.clone(),
            channel.clone(),
            media,
            &config,
        ));
        Rig {
            backend,
            store,
            channel,
            engine,
        }
    }

    fn text(user: &str, body: &str) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user.to_string()),
            reply_token: Some("tok".to_string()),
            kind: EventKind::Text(body.to_string()),
        }
    }

    fn location(user: &str, lat: f64, lon: f64, address: Option<String>) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user.to_string()),
            reply_token: Some("tok".to_string()),
            kind: EventKind::Location(LocationFix {
                latitude: lat,
                longitude: lon,
                address,
            }),
        }
    }

    fn image(user: &str, message_id: &str) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user.to_string()),
            reply_token: Some("tok".to_string()),
            kind: EventKind::Image {
                message_id: MessageId(message_id.to_string()),
            },
        }
    }

    fn packed(txn: &TransactionId, acc: f64, age_s: i64) -> String {
        let ts = Utc::now().timestamp_millis() - age_s * 1000;
        format!("12 Example Rd (txn={txn}|acc={acc}|ts={ts})")
    }

    async fn register(rig: &Rig, user: &str) {
        rig.store
            .append_employee(&Employee::new(
                UserId(user.to_string()),
                "Ann".to_string(),
                "Technician".to_string(),
            ))
            .await
            .unwrap();
    }

    fn seed_site(rig: &Rig) {
        rig.backend.seed_rows(
            "Locations",
            vec![
                vec![
                    "name".into(),
                    "group".into(),
                    "lat".into(),
                    "lon".into(),
                    "checkin_radius_m".into(),
                    "submission_radius_m".into(),
                ],
                vec![
                    "Depot".into(),
                    "north".into(),
                    "13.7563".into(),
                    "100.5018".into(),
                    "100".into(),
                    "150".into(),
                ],
            ],
        );
    }

    async fn last_text(rig: &Rig) -> String {
        rig.channel
            .sent_texts()
            .await
            .last()
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn unregistered_text_gets_the_registration_hint() {
        let rig = rig();
        rig.engine.handle_event(text("U1", "hello")).await;
        assert!(last_text(&rig).await.contains("register"));
        assert_eq!(rig.backend.row_count("Employees"), 0);
    }

    #[tokio::test]
    async fn register_prompt_then_comma_text_appends_the_row() {
        let rig = rig();
        rig.engine.handle_event(text("U1", "register")).await;
        assert!(last_text(&rig).await.contains("name and position"));

        rig.engine.handle_event(text("U1", "Ann, Technician")).await;
        assert_eq!(rig.backend.row_count("Employees"), 1);
        let rows = rig.backend.rows("Employees");
        assert_eq!(rows[0][0], "U1");
        assert_eq!(rows[0][1], "Ann");
        assert_eq!(rows[0][2], "Technician");
        assert_eq!(rows[0][3], "idle");

        rig.engine.handle_event(text("U1", "register")).await;
        assert!(last_text(&rig).await.contains("already registered"));
    }

    #[tokio::test]
    async fn malformed_registration_appends_nothing() {
        let rig = rig();
        rig.engine.handle_event(text("U1", "Ann,")).await;
        assert_eq!(rig.backend.row_count("Employees"), 0);
        assert!(last_text(&rig).await.contains("name and position"));
    }

    #[tokio::test]
    async fn checkin_start_moves_to_waiting_location_with_capture_button() {
        let rig = rig();
        register(&rig, "U1").await;

        rig.engine.handle_event(text("U1", "check in")).await;

        let employee = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            employee.state,
            EmployeeState::waiting_location(FlowKind::Checkin)
        );
        let txn = employee.transaction_id.unwrap();

        let sent = rig.channel.sent_messages().await;
        let uri = sent[0].messages[0]
            .quick_actions
            .iter()
            .find_map(|a| match &a.kind {
                fieldops_core::QuickActionKind::Uri(uri) => Some(uri.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(uri, format!("https://liff.line.me/liff-123?txn={txn}"));
    }

    #[tokio::test]
    async fn starting_twice_reports_the_open_flow() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.engine.handle_event(text("U1", "check in")).await;
        rig.engine.handle_event(text("U1", "submit")).await;
        assert!(last_text(&rig).await.contains("check-in"));
        assert!(last_text(&rig).await.contains("open"));
    }

    #[tokio::test]
    async fn accepted_location_creates_the_row_and_advances() {
        let rig = rig();
        register(&rig, "U1").await;
        seed_site(&rig);
        rig.engine.handle_event(text("U1", "check in")).await;
        let txn = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap()
            .transaction_id
            .unwrap();

        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 8.0, 2)),
            ))
            .await;

        let employee = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            employee.state,
            EmployeeState::waiting_images(FlowKind::Checkin)
        );
        let (record, _) = rig
            .store
            .find_txn(FlowKind::Checkin, &txn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.site_name, "Depot");
        assert!(last_text(&rig).await.contains("Depot"));
    }

    #[tokio::test]
    async fn location_with_foreign_txn_is_rejected_without_state_change() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.engine.handle_event(text("U1", "check in")).await;

        let foreign = TransactionId("someone-elses".to_string());
        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&foreign, 8.0, 2)),
            ))
            .await;

        assert!(last_text(&rig).await.contains("transaction reference"));
        let employee = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            employee.state,
            EmployeeState::waiting_location(FlowKind::Checkin)
        );
        assert_eq!(rig.backend.row_count("Checkins"), 0);
    }

    #[tokio::test]
    async fn bare_location_without_metadata_is_rejected() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.engine.handle_event(text("U1", "check in")).await;

        rig.engine
            .handle_event(location("U1", 13.7563, 100.5018, None))
            .await;
        assert!(last_text(&rig).await.contains("transaction reference"));
    }

    #[tokio::test]
    async fn poor_accuracy_and_stale_fixes_are_rejected_in_order() {
        let rig = rig();
        register(&rig, "U1").await;
        seed_site(&rig);
        rig.engine.handle_event(text("U1", "check in")).await;
        let txn = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap()
            .transaction_id
            .unwrap();

        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 500.0, 2)),
            ))
            .await;
        assert!(last_text(&rig).await.contains("accuracy"));

        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 8.0, 100_000)),
            ))
            .await;
        assert!(last_text(&rig).await.contains("too old"));
        assert_eq!(rig.backend.row_count("Checkins"), 0);
    }

    #[tokio::test]
    async fn valid_location_outside_the_location_step_prompts_a_start() {
        let rig = rig();
        register(&rig, "U1").await;
        let user = UserId("U1".into());
        let txn = TransactionId("t-open".to_string());
        rig.store
            .set_employee_state(
                &user,
                EmployeeState::waiting_images(FlowKind::Checkin),
                Some(&txn),
            )
            .await
            .unwrap();

        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 8.0, 2)),
            ))
            .await;
        assert!(last_text(&rig).await.contains("start"));
    }

    #[tokio::test]
    async fn checkin_auto_finalizes_on_the_third_image() {
        let rig = rig();
        register(&rig, "U1").await;
        seed_site(&rig);
        rig.engine.handle_event(text("U1", "check in")).await;
        let user = UserId("U1".into());
        let txn = rig
            .store
            .find_employee(&user)
            .await
            .unwrap()
            .unwrap()
            .transaction_id
            .unwrap();
        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 8.0, 2)),
            ))
            .await;

        for i in 0..3 {
            let id = format!("m{i}");
            rig.channel
                .stage_content(&MessageId(id.clone()), flat_jpeg(64, 64, 80 + i as u8))
                .await;
            rig.engine.handle_event(image("U1", &id)).await;
        }

        let employee = rig.store.find_employee(&user).await.unwrap().unwrap();
        assert_eq!(employee.state, EmployeeState::Idle);
        assert_eq!(employee.transaction_id, None);
        let (record, _) = rig
            .store
            .find_txn(FlowKind::Checkin, &txn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TxnStatus::Done);
        assert_eq!(record.filled_count(), 3);
        assert!(last_text(&rig).await.contains("now closed"));
    }

    #[tokio::test]
    async fn submission_waits_for_the_finish_command_at_three() {
        let rig = rig();
        register(&rig, "U1").await;
        seed_site(&rig);
        rig.engine.handle_event(text("U1", "submit")).await;
        let user = UserId("U1".into());
        let txn = rig
            .store
            .find_employee(&user)
            .await
            .unwrap()
            .unwrap()
            .transaction_id
            .unwrap();
        rig.engine
            .handle_event(location(
                "U1",
                13.7563,
                100.5018,
                Some(packed(&txn, 8.0, 2)),
            ))
            .await;

        for i in 0..3 {
            let id = format!("m{i}");
            rig.channel
                .stage_content(&MessageId(id.clone()), flat_jpeg(64, 64, 80 + i as u8))
                .await;
            rig.engine.handle_event(image("U1", &id)).await;
        }

        let (record, _) = rig
            .store
            .find_txn(FlowKind::Submission, &txn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TxnStatus::InProgress);
        assert!(last_text(&rig).await.contains("done"));

        rig.engine.handle_event(text("U1", "done")).await;
        let (record, _) = rig
            .store
            .find_txn(FlowKind::Submission, &txn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TxnStatus::Done);
        assert!(last_text(&rig).await.contains("Submission recorded"));
    }

    #[tokio::test]
    async fn image_for_a_vanished_row_asks_for_a_restart() {
        let rig = rig();
        register(&rig, "U1").await;
        let user = UserId("U1".into());
        let txn = TransactionId("ghost".to_string());
        rig.store
            .set_employee_state(
                &user,
                EmployeeState::waiting_images(FlowKind::Checkin),
                Some(&txn),
            )
            .await
            .unwrap();

        rig.channel
            .stage_content(&MessageId("m1".into()), flat_jpeg(64, 64, 90))
            .await;
        rig.engine.handle_event(image("U1", "m1")).await;

        assert!(last_text(&rig).await.contains("start the check-in again"));
        // Validation never mutates state; cancel remains the way out.
        let employee = rig.store.find_employee(&user).await.unwrap().unwrap();
        assert!(employee.state.is_waiting());
    }

    #[tokio::test]
    async fn cancel_works_even_before_the_row_exists() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.engine.handle_event(text("U1", "check in")).await;

        rig.engine.handle_event(text("U1", "cancel")).await;

        let employee = rig
            .store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(employee.state, EmployeeState::Idle);
        assert_eq!(employee.transaction_id, None);
        assert!(last_text(&rig).await.contains("cancelled"));
    }

    #[tokio::test]
    async fn cancel_with_nothing_open_says_so() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.engine.handle_event(text("U1", "cancel")).await;
        assert!(last_text(&rig).await.contains("nothing in progress"));
    }

    #[tokio::test]
    async fn image_outside_the_image_step_is_refused() {
        let rig = rig();
        register(&rig, "U1").await;
        rig.channel
            .stage_content(&MessageId("m1".into()), flat_jpeg(64, 64, 90))
            .await;
        rig.engine.handle_event(image("U1", "m1")).await;
        assert!(last_text(&rig).await.contains("not at the photo step"));
    }

    #[tokio::test]
    async fn stray_text_while_waiting_for_images_reprompts() {
        let rig = rig();
        register(&rig, "U1").await;
        let user = UserId("U1".into());
        rig.store
            .set_employee_state(
                &user,
                EmployeeState::waiting_images(FlowKind::Submission),
                Some(&TransactionId("t1".into())),
            )
            .await
            .unwrap();

        rig.engine.handle_event(text("U1", "how do I proceed")).await;
        assert!(last_text(&rig).await.contains("photo"));
    }

    #[tokio::test]
    async fn unreadable_employee_sheet_degrades_to_try_again() {
        let rig = rig();
        rig.backend.fail_next_reads(1);
        rig.engine.handle_event(text("U1", "check in")).await;
        assert!(last_text(&rig).await.contains("try again"));
    }

    #[tokio::test]
    async fn failed_reply_falls_back_to_push() {
        let rig = rig();
        rig.channel.fail_next_replies(1);
        rig.engine.handle_event(text("U1", "hello")).await;

        let sent = rig.channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0].via,
            fieldops_test_utils::Delivery::Push { .. }
        ));
    }

    #[tokio::test]
    async fn run_loop_consumes_injected_events_until_cancelled() {
        let rig = rig();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(rig.engine.clone().run(shutdown.clone()));

        rig.channel.inject_event(text("U1", "hello")).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while rig.channel.sent_count().await == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        handle.await.unwrap();
        assert!(last_text(&rig).await.contains("register"));
    }
}
