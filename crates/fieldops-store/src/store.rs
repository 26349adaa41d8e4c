// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The row-store adapter: bounded-time, retrying, idempotent access to the
//! tabular backend.
//!
//! Every backend call goes through a hard timeout so a hung request surfaces
//! as [`FieldopsError::Timeout`] instead of wedging a handler. Interactive
//! mutations additionally retry with exponential backoff. Appends are never
//! blindly retried: a failed append re-checks for the row first, because
//! "request failed" and "write landed but the response was lost" are
//! indistinguishable over this backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use fieldops_config::model::SheetsConfig;
use fieldops_core::{
    EmployeeState, FieldopsError, FlowKind, TabularBackend, TransactionId, TxnStatus, UserId,
};
use fieldops_geo::{parse_site_rows, Site};

use crate::records::{now_timestamp, Employee, TxnRecord};

/// A1 column spans per collection, without the sheet prefix.
const EMPLOYEES_RANGE: &str = "A:E";
const CHECKINS_RANGE: &str = "A:M";
const SUBMISSIONS_RANGE: &str = "A:S";
const LOCATIONS_RANGE: &str = "A:F";

struct EmployeeCacheEntry {
    rows: Vec<Employee>,
    fetched_at: Instant,
}

/// Bounded-time, idempotent row store over a [`TabularBackend`].
///
/// Owns the sheet tab names, the timeout/retry tuning, a TTL cache in front
/// of the Employees collection, and a transaction-id to row-index cache that
/// lets finalize fall back to a narrow write when a fresh read fails.
pub struct RowStore {
    backend: Arc<dyn TabularBackend>,
    employees_sheet: String,
    checkins_sheet: String,
    submissions_sheet: String,
    locations_sheet: String,
    execute_timeout: Duration,
    quick_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    employee_cache: RwLock<Option<EmployeeCacheEntry>>,
    employee_cache_ttl: Duration,
    row_index_cache: DashMap<(FlowKind, String), usize>,
}

impl RowStore {
    pub fn new(backend: Arc<dyn TabularBackend>, config: &SheetsConfig) -> Self {
        Self {
            backend,
            employees_sheet: config.employees_sheet.clone(),
            checkins_sheet: config.checkins_sheet.clone(),
            submissions_sheet: config.submissions_sheet.clone(),
            locations_sheet: config.locations_sheet.clone(),
            execute_timeout: Duration::from_secs(config.execute_timeout_s),
            quick_timeout: Duration::from_secs(config.quick_timeout_s),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_secs_f64(config.backoff_base_s),
            employee_cache: RwLock::new(None),
            employee_cache_ttl: Duration::from_secs(config.employee_cache_ttl_s),
            row_index_cache: DashMap::new(),
        }
    }

    /// Sheet tab holding the given flow's transaction records.
    pub fn sheet_for(&self, flow: FlowKind) -> &str {
        match flow {
            FlowKind::Checkin => &self.checkins_sheet,
            FlowKind::Submission => &self.submissions_sheet,
        }
    }

    fn range_for(flow: FlowKind) -> &'static str {
        match flow {
            FlowKind::Checkin => CHECKINS_RANGE,
            FlowKind::Submission => SUBMISSIONS_RANGE,
        }
    }

    fn last_col(flow: FlowKind) -> char {
        match flow {
            FlowKind::Checkin => 'M',
            FlowKind::Submission => 'S',
        }
    }

    /// The default quick-read budget (sweeper reads).
    pub fn quick_timeout(&self) -> Duration {
        self.quick_timeout
    }

    // --- call plumbing ---

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = Result<T, FieldopsError>>,
    ) -> Result<T, FieldopsError> {
        match tokio::time::timeout(self.execute_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(what, timeout_s = self.execute_timeout.as_secs(), "backend call timed out");
                Err(FieldopsError::Timeout {
                    duration: self.execute_timeout,
                })
            }
        }
    }

    /// Retry a mutating call with exponential backoff. Only transient
    /// failures are retried; anything else propagates immediately.
    async fn with_retry<T, F, Fut>(
        &self,
        what: &'static str,
        mut op: F,
    ) -> Result<T, FieldopsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FieldopsError>>,
    {
        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.backoff_base.mul_f64(2f64.powi(attempt as i32 - 1));
                warn!(what, attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            match self.bounded(what, op()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| FieldopsError::Internal(format!("{what}: no attempts made"))))
    }

    /// Short-timeout, no-retry read for the sweeper. `None` means "skip
    /// this cycle", never an error.
    async fn read_quick(
        &self,
        sheet: &str,
        range: &str,
        budget: Duration,
    ) -> Option<Vec<Vec<String>>> {
        match tokio::time::timeout(budget, self.backend.read_range(sheet, range)).await {
            Ok(Ok(rows)) => Some(rows),
            Ok(Err(e)) => {
                warn!(sheet, error = %e, "quick read failed, skipping cycle");
                None
            }
            Err(_) => {
                warn!(sheet, budget_ms = budget.as_millis() as u64, "quick read timed out, skipping cycle");
                None
            }
        }
    }

    // --- Employees ---

    /// All employees, via the TTL cache. A failed refresh serves the stale
    /// snapshot so a transient outage never turns a registered user into an
    /// unregistered one.
    pub async fn employees(&self) -> Result<Vec<Employee>, FieldopsError> {
        {
            let guard = self.employee_cache.read().await;
            if let Some(entry) = guard.as_ref() {
                if entry.fetched_at.elapsed() < self.employee_cache_ttl {
                    return Ok(entry.rows.clone());
                }
            }
        }
        match self.read_employees().await {
            Ok(rows) => {
                let mut guard = self.employee_cache.write().await;
                *guard = Some(EmployeeCacheEntry {
                    rows: rows.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(rows)
            }
            Err(e) => {
                let guard = self.employee_cache.read().await;
                if let Some(entry) = guard.as_ref() {
                    warn!(error = %e, "employee refresh failed, serving stale cache");
                    return Ok(entry.rows.clone());
                }
                Err(e)
            }
        }
    }

    /// One employee by user id, via the cache.
    pub async fn find_employee(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Employee>, FieldopsError> {
        Ok(self
            .employees()
            .await?
            .into_iter()
            .find(|e| &e.user_id == user_id))
    }

    async fn read_employees(&self) -> Result<Vec<Employee>, FieldopsError> {
        let rows = self
            .bounded(
                "read employees",
                self.backend.read_range(&self.employees_sheet, EMPLOYEES_RANGE),
            )
            .await?;
        Ok(rows.iter().filter_map(|r| Employee::from_row(r)).collect())
    }

    /// Fresh (uncached) lookup returning the 1-based sheet row index, for
    /// writes that must hit the right row.
    async fn find_employee_row(
        &self,
        user_id: &UserId,
    ) -> Result<Option<(Employee, usize)>, FieldopsError> {
        let rows = self
            .bounded(
                "read employees",
                self.backend.read_range(&self.employees_sheet, EMPLOYEES_RANGE),
            )
            .await?;
        for (i, row) in rows.iter().enumerate() {
            if row.first().map(String::as_str) == Some(user_id.0.as_str()) {
                if let Some(emp) = Employee::from_row(row) {
                    return Ok(Some((emp, i + 1)));
                }
            }
        }
        Ok(None)
    }

    /// Register a new employee. A failed append re-checks for the row before
    /// the final attempt so a lost response cannot duplicate the user.
    pub async fn append_employee(&self, employee: &Employee) -> Result<(), FieldopsError> {
        let row = employee.to_row();
        let append = self.bounded(
            "append employee",
            self.backend
                .append_row(&self.employees_sheet, EMPLOYEES_RANGE, row.clone()),
        );
        if let Err(e) = append.await {
            warn!(user_id = %employee.user_id, error = %e, "employee append failed once, re-checking");
            if self.find_employee_row(&employee.user_id).await?.is_none() {
                self.bounded(
                    "append employee retry",
                    self.backend
                        .append_row(&self.employees_sheet, EMPLOYEES_RANGE, row),
                )
                .await?;
            }
        }
        self.invalidate_employees().await;
        Ok(())
    }

    /// Update an employee's FSM state and current transaction id.
    ///
    /// `transaction_id = None` clears the cell. Callers keep the cell
    /// non-empty exactly while the state is a waiting state.
    pub async fn set_employee_state(
        &self,
        user_id: &UserId,
        state: EmployeeState,
        transaction_id: Option<&TransactionId>,
    ) -> Result<(), FieldopsError> {
        let Some((mut employee, idx)) = self.find_employee_row(user_id).await? else {
            return Err(FieldopsError::Internal(format!(
                "employee {user_id} not found for state update"
            )));
        };
        employee.state = state;
        employee.transaction_id = transaction_id.cloned();
        let row = employee.to_row();
        let range = format!("A{idx}:E{idx}");
        self.with_retry("update employee row", || {
            let rows = vec![row.clone()];
            let range = range.clone();
            async move {
                self.backend
                    .update_range(&self.employees_sheet, &range, rows)
                    .await
            }
        })
        .await?;
        debug!(user_id = %user_id, state = %state, "employee state updated");
        self.invalidate_employees().await;
        Ok(())
    }

    async fn invalidate_employees(&self) {
        *self.employee_cache.write().await = None;
    }

    // --- Sites ---

    /// Load the site list fresh from the Locations tab. Never cached: a
    /// sheet edit takes effect on the next geofence query.
    pub async fn load_sites(&self) -> Result<Vec<Site>, FieldopsError> {
        let rows = self
            .bounded(
                "read locations",
                self.backend.read_range(&self.locations_sheet, LOCATIONS_RANGE),
            )
            .await?;
        Ok(parse_site_rows(&rows))
    }

    // --- Transactions ---

    /// Find a transaction row by id. Feeds the row-index cache on a hit.
    pub async fn find_txn(
        &self,
        flow: FlowKind,
        id: &TransactionId,
    ) -> Result<Option<(TxnRecord, usize)>, FieldopsError> {
        let rows = self
            .bounded(
                "read txn sheet",
                self.backend.read_range(self.sheet_for(flow), Self::range_for(flow)),
            )
            .await?;
        for (i, row) in rows.iter().enumerate() {
            if row.first().map(String::as_str) == Some(id.0.as_str()) {
                let Some(record) = TxnRecord::from_row(flow, row) else {
                    continue;
                };
                let idx = i + 1;
                self.row_index_cache.insert((flow, id.0.clone()), idx);
                return Ok(Some((record, idx)));
            }
        }
        Ok(None)
    }

    /// All parseable transaction rows with their 1-based indices, on the
    /// bounded interactive read path (duplicate-hash scans).
    pub async fn read_txns(
        &self,
        flow: FlowKind,
    ) -> Result<Vec<(TxnRecord, usize)>, FieldopsError> {
        let rows = self
            .bounded(
                "read txn sheet",
                self.backend.read_range(self.sheet_for(flow), Self::range_for(flow)),
            )
            .await?;
        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| TxnRecord::from_row(flow, row).map(|r| (r, i + 1)))
            .collect())
    }

    /// All parseable transaction rows with their 1-based indices, on the
    /// quick-read path. `None` means skip this sweep cycle.
    pub async fn read_txns_quick(
        &self,
        flow: FlowKind,
        budget: Duration,
    ) -> Option<Vec<(TxnRecord, usize)>> {
        let rows = self
            .read_quick(self.sheet_for(flow), Self::range_for(flow), budget)
            .await?;
        Some(
            rows.iter()
                .enumerate()
                .filter_map(|(i, row)| TxnRecord::from_row(flow, row).map(|r| (r, i + 1)))
                .collect(),
        )
    }

    /// Create or patch the row for a transaction id, idempotently.
    ///
    /// An existing row keeps its images and status (empty status heals to
    /// `pending` via the codec) and gets site/distance/name/timestamp
    /// patched. A missing row is appended once; on append failure the row is
    /// re-checked before one final attempt. Returns the row index when it
    /// could be determined.
    pub async fn upsert_txn(&self, record: &TxnRecord) -> Result<Option<usize>, FieldopsError> {
        if let Some((mut existing, idx)) = self.find_txn(record.flow, &record.id).await? {
            existing.site_name = record.site_name.clone();
            existing.site_group = record.site_group.clone();
            existing.last_updated_at = now_timestamp();
            existing.distance_m = record.distance_m;
            if !record.employee_name.is_empty() {
                existing.employee_name = record.employee_name.clone();
            }
            self.update_txn_row(record.flow, idx, &existing).await?;
            debug!(txn_id = %record.id, row = idx, "txn row patched in place");
            return Ok(Some(idx));
        }

        let sheet = self.sheet_for(record.flow);
        let range = Self::range_for(record.flow);
        let row = record.to_row();
        let append = self.bounded(
            "append txn row",
            self.backend.append_row(sheet, range, row.clone()),
        );
        if let Err(e) = append.await {
            warn!(txn_id = %record.id, error = %e, "txn append failed once, re-checking");
            if let Some((_, idx)) = self.find_txn(record.flow, &record.id).await? {
                return Ok(Some(idx));
            }
            self.bounded(
                "append txn row retry",
                self.backend.append_row(sheet, range, row),
            )
            .await?;
        }

        // Locate the appended row for the index cache. The write has landed
        // at this point, so a failed locate degrades to an unknown index
        // rather than failing the upsert.
        match self.find_txn(record.flow, &record.id).await {
            Ok(Some((_, idx))) => Ok(Some(idx)),
            Ok(None) => {
                warn!(txn_id = %record.id, "appended txn row not yet visible");
                Ok(None)
            }
            Err(e) => {
                warn!(txn_id = %record.id, error = %e, "could not locate appended txn row");
                Ok(None)
            }
        }
    }

    /// Overwrite a full transaction row.
    pub async fn update_txn_row(
        &self,
        flow: FlowKind,
        idx: usize,
        record: &TxnRecord,
    ) -> Result<(), FieldopsError> {
        let range = format!("A{idx}:{}{idx}", Self::last_col(flow));
        let row = record.to_row();
        self.with_retry("update txn row", || {
            let rows = vec![row.clone()];
            let range = range.clone();
            async move {
                self.backend
                    .update_range(self.sheet_for(flow), &range, rows)
                    .await
            }
        })
        .await?;
        self.row_index_cache.insert((flow, record.id.0.clone()), idx);
        Ok(())
    }

    /// Narrow write of just the `last_updated_at` and `status` cells
    /// (columns I:J), for finalize when the row index is already known.
    pub async fn update_txn_status(
        &self,
        flow: FlowKind,
        idx: usize,
        last_updated_at: &str,
        status: TxnStatus,
    ) -> Result<(), FieldopsError> {
        let range = format!("I{idx}:J{idx}");
        let values = vec![vec![last_updated_at.to_string(), status.to_string()]];
        self.with_retry("update txn status", || {
            let rows = values.clone();
            let range = range.clone();
            async move {
                self.backend
                    .update_range(self.sheet_for(flow), &range, rows)
                    .await
            }
        })
        .await
    }

    /// Last known row index for a transaction, from previous finds/writes.
    pub fn cached_row_index(&self, flow: FlowKind, id: &TransactionId) -> Option<usize> {
        self.row_index_cache
            .get(&(flow, id.0.clone()))
            .map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_test_utils::MemoryBackend;

    fn tuned_config() -> SheetsConfig {
        SheetsConfig {
            execute_timeout_s: 2,
            quick_timeout_s: 1,
            max_attempts: 3,
            backoff_base_s: 0.01,
            employee_cache_ttl_s: 30,
            ..SheetsConfig::default()
        }
    }

    fn store_over(backend: Arc<MemoryBackend>) -> RowStore {
        RowStore::new(backend, &tuned_config())
    }

    fn sample_employee(id: &str) -> Employee {
        Employee::new(UserId(id.into()), "Ann".into(), "Technician".into())
    }

    fn sample_txn(flow: FlowKind, id: &str) -> TxnRecord {
        TxnRecord::new(
            flow,
            TransactionId(id.into()),
            UserId("U1".into()),
            "Depot".into(),
            "North".into(),
            12.0,
            "Ann".into(),
        )
    }

    #[tokio::test]
    async fn append_and_find_employee() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend);
        store.append_employee(&sample_employee("U1")).await.unwrap();
        let found = store.find_employee(&UserId("U1".into())).await.unwrap();
        assert_eq!(found.unwrap().name, "Ann");
        let missing = store.find_employee(&UserId("U2".into())).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn employee_cache_serves_stale_on_refresh_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let store = RowStore::new(
            backend.clone(),
            &SheetsConfig {
                employee_cache_ttl_s: 0, // every read is a refresh
                ..tuned_config()
            },
        );
        store.append_employee(&sample_employee("U1")).await.unwrap();
        assert!(store.find_employee(&UserId("U1".into())).await.unwrap().is_some());

        backend.fail_next_reads(5);
        // Refresh fails, but the stale snapshot still answers.
        let found = store.find_employee(&UserId("U1".into())).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn set_employee_state_round_trips() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend);
        store.append_employee(&sample_employee("U1")).await.unwrap();
        let txn = TransactionId("t-9".into());
        store
            .set_employee_state(
                &UserId("U1".into()),
                EmployeeState::WaitingForCheckinLocation,
                Some(&txn),
            )
            .await
            .unwrap();
        let emp = store
            .find_employee(&UserId("U1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(emp.state, EmployeeState::WaitingForCheckinLocation);
        assert_eq!(emp.transaction_id, Some(txn));
    }

    #[tokio::test]
    async fn upsert_twice_yields_one_row() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend.clone());
        let rec = sample_txn(FlowKind::Checkin, "txn-1");
        let idx1 = store.upsert_txn(&rec).await.unwrap();
        let idx2 = store.upsert_txn(&rec).await.unwrap();
        assert_eq!(idx1, idx2);
        assert_eq!(backend.row_count("Checkins"), 1);
    }

    #[tokio::test]
    async fn upsert_patch_preserves_images_and_status() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend);
        let rec = sample_txn(FlowKind::Checkin, "txn-2");
        let idx = store.upsert_txn(&rec).await.unwrap().unwrap();

        let (mut stored, _) = store
            .find_txn(FlowKind::Checkin, &rec.id)
            .await
            .unwrap()
            .unwrap();
        stored.image_urls[0] = Some("https://img/1.jpg".into());
        stored.status = TxnStatus::InProgress;
        store
            .update_txn_row(FlowKind::Checkin, idx, &stored)
            .await
            .unwrap();

        // Retry of the original location event.
        store.upsert_txn(&rec).await.unwrap();
        let (after, _) = store
            .find_txn(FlowKind::Checkin, &rec.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.image_urls[0].as_deref(), Some("https://img/1.jpg"));
        assert_eq!(after.status, TxnStatus::InProgress);
    }

    #[tokio::test]
    async fn lost_append_response_does_not_duplicate() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend.clone());
        // The append lands but its response is dropped.
        backend.drop_next_append_responses(1);
        let rec = sample_txn(FlowKind::Submission, "txn-3");
        let idx = store.upsert_txn(&rec).await.unwrap();
        assert!(idx.is_some());
        assert_eq!(backend.row_count("Submissions"), 1);
    }

    #[tokio::test]
    async fn narrow_status_update_touches_only_i_j() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend);
        let rec = sample_txn(FlowKind::Checkin, "txn-4");
        let idx = store.upsert_txn(&rec).await.unwrap().unwrap();
        store
            .update_txn_status(FlowKind::Checkin, idx, "2026-08-25 10:00:00", TxnStatus::Done)
            .await
            .unwrap();
        let (after, _) = store
            .find_txn(FlowKind::Checkin, &rec.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, TxnStatus::Done);
        assert_eq!(after.last_updated_at, "2026-08-25 10:00:00");
        assert_eq!(after.site_name, "Depot");
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_update_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend.clone());
        store.append_employee(&sample_employee("U1")).await.unwrap();
        backend.fail_next_updates(1);
        store
            .set_employee_state(&UserId("U1".into()), EmployeeState::Idle, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn quick_read_failure_is_none_not_error() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend.clone());
        backend.fail_next_reads(1);
        let got = store
            .read_txns_quick(FlowKind::Checkin, Duration::from_millis(200))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn load_sites_parses_locations_tab() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed_rows(
            "Locations",
            vec![
                vec!["name", "group", "lat", "lon", "ci", "sub"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                vec!["Depot", "North", "13.75", "100.5", "300", "150"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ],
        );
        let store = store_over(backend);
        let sites = store.load_sites().await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "Depot");
    }

    #[tokio::test]
    async fn row_index_cache_remembers_found_rows() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(backend);
        let rec = sample_txn(FlowKind::Checkin, "txn-5");
        assert_eq!(store.cached_row_index(FlowKind::Checkin, &rec.id), None);
        let idx = store.upsert_txn(&rec).await.unwrap().unwrap();
        assert_eq!(store.cached_row_index(FlowKind::Checkin, &rec.id), Some(idx));
    }
}
