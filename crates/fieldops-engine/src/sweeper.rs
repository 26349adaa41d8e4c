// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction timeout handling.
//!
//! Two trigger paths converge here: an inline check at the top of every
//! inbound event, and a periodic background sweep for users who simply
//! stopped talking. Both take the per-transaction lock and re-read the
//! row inside it, so a warning or timeout is written exactly once no
//! matter which path gets there first.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fieldops_config::model::FlowConfig;
use fieldops_core::{
    EmployeeState, FieldopsError, FlowKind, MessagingChannel, OutboundMessage, TransactionId,
    TxnStatus, UserId,
};
use fieldops_store::{now_timestamp, Employee, RowStore};

use crate::locks::TxnLocks;
use crate::machine::FlowMachine;
use crate::messages;
use crate::metrics;

/// What the inline check decided about the event being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutVerdict {
    /// No open transaction, or it is still inside its budget.
    Clear,
    /// A warning went out on this event. The reply token is spent, but
    /// the event itself should still be handled.
    Warned,
    /// The transaction was finalized as timed out. The triggering event
    /// must not be processed any further.
    TimedOut,
}

/// Lock-side decision for one transaction row.
enum Due {
    No,
    Warn { seconds_left: u64 },
    Timeout,
}

pub struct TimeoutSweeper {
    store: Arc<RowStore>,
    machine: Arc<FlowMachine>,
    locks: Arc<TxnLocks>,
    channel: Arc<dyn MessagingChannel>,
    timeout: Duration,
    warning_window: Duration,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(
        store: Arc<RowStore>,
        machine: Arc<FlowMachine>,
        locks: Arc<TxnLocks>,
        channel: Arc<dyn MessagingChannel>,
        config: &FlowConfig,
    ) -> Self {
        Self {
            store,
            machine,
            locks,
            channel,
            timeout: Duration::from_secs(config.timeout_s),
            warning_window: Duration::from_secs(config.warning_window_s),
            interval: Duration::from_secs(config.sweep_interval_s),
        }
    }

    /// Inline check, run before an inbound event is dispatched.
    ///
    /// Store failures fail open: a sheet hiccup must not block normal
    /// handling, and the background sweep will catch up.
    pub async fn check_on_event(
        &self,
        employee: &Employee,
        reply_token: Option<&str>,
    ) -> TimeoutVerdict {
        if !employee.state.expects_images() {
            return TimeoutVerdict::Clear;
        }
        let (Some(flow), Some(txn)) = (employee.state.flow(), employee.transaction_id.clone())
        else {
            return TimeoutVerdict::Clear;
        };

        match self.evaluate_and_latch(flow, &txn).await {
            Ok(Due::No) => TimeoutVerdict::Clear,
            Ok(Due::Warn { seconds_left }) => {
                info!(user_id = %employee.user_id, txn_id = %txn, seconds_left, "timeout warning");
                self.notify(
                    reply_token,
                    &employee.user_id,
                    messages::timeout_warning(seconds_left),
                )
                .await;
                TimeoutVerdict::Warned
            }
            Ok(Due::Timeout) => {
                self.machine
                    .finalize(flow, &employee.user_id, &txn, TxnStatus::Timeout)
                    .await;
                self.notify(
                    reply_token,
                    &employee.user_id,
                    messages::timed_out(flow, self.timeout.as_secs()),
                )
                .await;
                TimeoutVerdict::TimedOut
            }
            Err(e) => {
                warn!(user_id = %employee.user_id, txn_id = %txn, error = %e, "inline timeout check failed");
                TimeoutVerdict::Clear
            }
        }
    }

    /// Tick until cancelled. Cycles start one full interval after spawn.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;
        info!(interval_s = self.interval.as_secs(), "timeout sweeper running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("timeout sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_cycle().await;
                }
            }
        }
    }

    /// One pass over both transaction tabs.
    ///
    /// Reads use the quick no-retry path; any miss skips the whole cycle
    /// rather than competing with interactive traffic for the backend.
    pub async fn sweep_cycle(&self) {
        metrics::record_sweep_cycle();

        let employees = match self.store.employees().await {
            Ok(employees) => employees,
            Err(e) => {
                warn!(error = %e, "sweep skipped, employee load failed");
                return;
            }
        };
        if !employees.iter().any(|e| e.state.is_waiting()) {
            return;
        }

        let budget = self.quick_budget();
        let mut open = Vec::new();
        for flow in [FlowKind::Checkin, FlowKind::Submission] {
            match self.store.read_txns_quick(flow, budget).await {
                Some(rows) => open.push((flow, rows)),
                None => {
                    debug!(flow = %flow, "sweep skipped, quick read missed its budget");
                    return;
                }
            }
        }

        let window = self.warning_window.as_secs() as i64;
        let now = Utc::now();
        for (flow, rows) in open {
            for (record, _) in rows {
                if record.status.is_terminal() {
                    continue;
                }
                let Some(last_touch) = record.last_touch() else {
                    continue;
                };
                let elapsed = now.signed_duration_since(last_touch).num_seconds();
                let left = self.timeout.as_secs() as i64 - elapsed;
                if left > window {
                    continue;
                }
                // Only act while the owning employee still points at the
                // row; an abandoned row is an audit record, not open work.
                let Some(owner) = employees.iter().find(|e| {
                    e.state == EmployeeState::waiting_images(flow)
                        && e.transaction_id.as_ref() == Some(&record.id)
                }) else {
                    continue;
                };
                self.sweep_one(flow, owner, &record.id).await;
            }
        }
    }

    async fn sweep_one(&self, flow: FlowKind, owner: &Employee, txn: &TransactionId) {
        match self.evaluate_and_latch(flow, txn).await {
            Ok(Due::No) => {}
            Ok(Due::Warn { seconds_left }) => {
                info!(user_id = %owner.user_id, txn_id = %txn, seconds_left, "sweep warned an idle transaction");
                self.notify(None, &owner.user_id, messages::timeout_warning(seconds_left))
                    .await;
            }
            Ok(Due::Timeout) => {
                info!(user_id = %owner.user_id, txn_id = %txn, flow = %flow, "sweep timed out a transaction");
                self.machine
                    .finalize(flow, &owner.user_id, txn, TxnStatus::Timeout)
                    .await;
                metrics::record_sweep_timeout(flow);
                self.notify(None, &owner.user_id, messages::timed_out(flow, self.timeout.as_secs()))
                    .await;
            }
            Err(e) => {
                warn!(txn_id = %txn, flow = %flow, error = %e, "sweep evaluation failed");
            }
        }
    }

    /// Decide for one row under its transaction lock, and latch the
    /// warning in the same critical section when one is due.
    ///
    /// The warning write refreshes `last_updated_at` so events inside
    /// the window do not re-warn; `warning_sent` stays latched even
    /// across that refresh.
    async fn evaluate_and_latch(
        &self,
        flow: FlowKind,
        txn: &TransactionId,
    ) -> Result<Due, FieldopsError> {
        let lock = self.locks.acquire(txn);
        let _held = lock.lock().await;

        let Some((mut record, idx)) = self.store.find_txn(flow, txn).await? else {
            return Ok(Due::No);
        };
        if record.status.is_terminal() {
            return Ok(Due::No);
        }
        // A row whose timestamps never parse cannot expire.
        let Some(last_touch) = record.last_touch() else {
            return Ok(Due::No);
        };

        let elapsed = Utc::now().signed_duration_since(last_touch).num_seconds();
        let left = self.timeout.as_secs() as i64 - elapsed;
        if left <= 0 {
            return Ok(Due::Timeout);
        }
        if left <= self.warning_window.as_secs() as i64 && !record.warning_sent {
            record.status = TxnStatus::Warning;
            record.warning_sent = true;
            record.last_updated_at = now_timestamp();
            self.store.update_txn_row(flow, idx, &record).await?;
            return Ok(Due::Warn {
                seconds_left: left as u64,
            });
        }
        Ok(Due::No)
    }

    /// Reply when a live token exists, push otherwise or on reply failure.
    async fn notify(&self, reply_token: Option<&str>, user: &UserId, message: OutboundMessage) {
        if let Some(token) = reply_token {
            if self.channel.reply(token, vec![message.clone()]).await.is_ok() {
                return;
            }
        }
        if let Err(e) = self.channel.push(user, vec![message]).await {
            warn!(user_id = %user, error = %e, "timeout notice undeliverable");
        }
    }

    /// Quick-read budget: the configured quick timeout, additionally
    /// capped so one read cannot overrun the sweep interval.
    fn quick_budget(&self) -> Duration {
        let interval_cap = self.interval.as_secs().saturating_sub(1).max(5);
        self.store
            .quick_timeout()
            .min(Duration::from_secs(interval_cap))
    }
}
