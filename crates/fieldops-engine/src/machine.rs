// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction state machine.
//!
//! Owns the employee state transitions and the transaction status
//! lifecycle `pending -> in_progress -> warning -> {done | timeout |
//! cancelled}`. The rules live here; the orchestrator and sweeper only
//! decide *when* to apply them.
//!
//! Ordering invariant: the transaction row is always written before the
//! employee row. An interrupted finalize then leaves a waiting employee
//! pointing at a terminal row, which the next event resolves, instead of
//! an idle employee with an open row nobody owns.

use std::sync::Arc;

use tracing::{info, warn};

use fieldops_core::{
    EmployeeState, FieldopsError, FlowKind, TransactionId, TxnStatus, UserId,
};
use fieldops_geo::{format_coords, SiteMatch};
use fieldops_store::{now_timestamp, Employee, RowStore, TxnRecord};

use crate::locks::TxnLocks;
use crate::metrics;

/// What a finalize managed to observe about the row it closed.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeOutcome {
    /// Image count from the freshest row read, when one succeeded.
    pub images: Option<usize>,
}

/// Status after another image lands on the row: terminal statuses hold,
/// everything else advances to `in_progress`.
pub(crate) fn advance_on_image(current: TxnStatus) -> TxnStatus {
    if current.is_terminal() {
        current
    } else {
        TxnStatus::InProgress
    }
}

pub struct FlowMachine {
    store: Arc<RowStore>,
    locks: Arc<TxnLocks>,
}

impl FlowMachine {
    pub fn new(store: Arc<RowStore>, locks: Arc<TxnLocks>) -> Self {
        Self { store, locks }
    }

    /// Mint a transaction id and move the employee to the flow's
    /// waiting-for-location state. No row exists yet; the record is first
    /// persisted when a location is accepted.
    pub async fn start_flow(
        &self,
        user: &UserId,
        flow: FlowKind,
    ) -> Result<TransactionId, FieldopsError> {
        let txn = TransactionId::generate();
        self.store
            .set_employee_state(user, EmployeeState::waiting_location(flow), Some(&txn))
            .await?;
        info!(user_id = %user, flow = %flow, txn_id = %txn, "flow started");
        Ok(txn)
    }

    /// Persist an accepted location as the transaction record (idempotent
    /// upsert) and advance the employee to the waiting-for-images state.
    ///
    /// Returns the row index when the store could determine it.
    pub async fn accept_location(
        &self,
        employee: &Employee,
        flow: FlowKind,
        txn: &TransactionId,
        site: &SiteMatch,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<usize>, FieldopsError> {
        let record = TxnRecord::new(
            flow,
            txn.clone(),
            employee.user_id.clone(),
            site.site_name
                .clone()
                .unwrap_or_else(|| format_coords(latitude, longitude)),
            site.site_group.clone().unwrap_or_default(),
            site.distance_m.unwrap_or(0.0),
            employee.name.clone(),
        );
        let idx = self.store.upsert_txn(&record).await?;
        self.store
            .set_employee_state(&employee.user_id, EmployeeState::waiting_images(flow), Some(txn))
            .await?;
        info!(
            user_id = %employee.user_id,
            flow = %flow,
            txn_id = %txn,
            site = %record.site_name,
            matched = site.matched,
            "location accepted"
        );
        Ok(idx)
    }

    /// Close a transaction: stamp `last_updated_at` and the terminal status
    /// on the row under the transaction lock, then idle the employee.
    ///
    /// Both legs are best-effort. A sheet that is down must not wedge the
    /// sweeper or leave a user permanently stuck, so failures are logged
    /// and the next event or sweep converges the rest.
    pub async fn finalize(
        &self,
        flow: FlowKind,
        user: &UserId,
        txn: &TransactionId,
        status: TxnStatus,
    ) -> FinalizeOutcome {
        let lock = self.locks.acquire(txn);
        let outcome = {
            let _held = lock.lock().await;
            self.stamp_row(flow, txn, status).await
        };

        if let Err(e) = self
            .store
            .set_employee_state(user, EmployeeState::Idle, None)
            .await
        {
            warn!(user_id = %user, txn_id = %txn, error = %e, "finalize could not idle the employee");
        }

        metrics::record_finalized(flow, status);
        info!(user_id = %user, flow = %flow, txn_id = %txn, status = %status, "transaction finalized");
        outcome
    }

    /// Row half of finalize. Narrow status write when the index is known,
    /// full-row fallback when a failed read left only a stale locate.
    async fn stamp_row(
        &self,
        flow: FlowKind,
        txn: &TransactionId,
        status: TxnStatus,
    ) -> FinalizeOutcome {
        let now = now_timestamp();
        match self.store.find_txn(flow, txn).await {
            Ok(Some((record, idx))) => {
                if record.status.is_terminal() {
                    // Already closed by a concurrent path; statuses are
                    // written exactly once.
                    return FinalizeOutcome {
                        images: Some(record.filled_count()),
                    };
                }
                if let Err(e) = self.store.update_txn_status(flow, idx, &now, status).await {
                    warn!(txn_id = %txn, row = idx, error = %e, "finalize status write failed");
                }
                FinalizeOutcome {
                    images: Some(record.filled_count()),
                }
            }
            Ok(None) => {
                warn!(txn_id = %txn, flow = %flow, "no transaction row to finalize");
                FinalizeOutcome { images: None }
            }
            Err(e) => {
                // The read failed; fall back to the cached index for a
                // narrow write, or one more locate for a full-row write.
                if let Some(idx) = self.store.cached_row_index(flow, txn) {
                    warn!(txn_id = %txn, row = idx, error = %e, "finalize read failed, stamping cached row");
                    if let Err(e) = self.store.update_txn_status(flow, idx, &now, status).await {
                        warn!(txn_id = %txn, row = idx, error = %e, "finalize status write failed");
                    }
                    return FinalizeOutcome { images: None };
                }
                match self.store.find_txn(flow, txn).await {
                    Ok(Some((mut record, idx))) => {
                        record.last_updated_at = now;
                        record.status = status;
                        if let Err(e) = self.store.update_txn_row(flow, idx, &record).await {
                            warn!(txn_id = %txn, row = idx, error = %e, "finalize full-row write failed");
                        }
                        FinalizeOutcome {
                            images: Some(record.filled_count()),
                        }
                    }
                    _ => {
                        warn!(txn_id = %txn, flow = %flow, error = %e, "finalize could not locate the row");
                        FinalizeOutcome { images: None }
                    }
                }
            }
        }
    }
}
