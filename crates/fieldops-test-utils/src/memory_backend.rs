// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory tabular backend for deterministic testing.
//!
//! `MemoryBackend` implements `TabularBackend` over a plain map of sheet
//! tabs. It mimics the read shape of the real spreadsheet API (trailing
//! empty cells are omitted from returned rows) and carries fault-injection
//! knobs for exercising the retry and idempotency paths:
//!
//! - [`MemoryBackend::fail_next_reads`] - the next N reads fail outright
//! - [`MemoryBackend::fail_next_updates`] - the next N updates fail outright
//! - [`MemoryBackend::drop_next_append_responses`] - the next N appends
//!   land in the sheet but return an error, simulating a lost response

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use fieldops_core::types::{AdapterType, HealthStatus};
use fieldops_core::{Adapter, FieldopsError, TabularBackend};

/// In-memory `TabularBackend` holding sheet tabs as vectors of string rows.
pub struct MemoryBackend {
    tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
    fail_reads: AtomicUsize,
    fail_updates: AtomicUsize,
    drop_append_responses: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend with no tabs and no armed faults.
    pub fn new() -> Self {
        Self {
            tabs: Mutex::new(HashMap::new()),
            fail_reads: AtomicUsize::new(0),
            fail_updates: AtomicUsize::new(0),
            drop_append_responses: AtomicUsize::new(0),
        }
    }

    /// Replace the contents of a tab with the given rows.
    pub fn seed_rows(&self, sheet: &str, rows: Vec<Vec<String>>) {
        self.lock_tabs().insert(sheet.to_string(), rows);
    }

    /// Arm the next `n` reads to fail with a store error.
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Arm the next `n` updates to fail with a store error.
    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Arm the next `n` appends to land but report failure, as when the
    /// write goes through and the HTTP response is lost.
    pub fn drop_next_append_responses(&self, n: usize) {
        self.drop_append_responses.store(n, Ordering::SeqCst);
    }

    /// Number of rows currently stored in a tab.
    pub fn row_count(&self, sheet: &str) -> usize {
        self.lock_tabs().get(sheet).map_or(0, Vec::len)
    }

    /// Full raw contents of a tab, untrimmed.
    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.lock_tabs().get(sheet).cloned().unwrap_or_default()
    }

    fn lock_tabs(&self) -> MutexGuard<'_, HashMap<String, Vec<Vec<String>>>> {
        match self.tabs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume one armed fault, returning true when a fault was pending.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Column letters of an A1 cell reference to a zero-based index (`A` -> 0).
fn col_index(letters: &str) -> usize {
    let mut acc = 0usize;
    for c in letters.chars() {
        acc = acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    acc.saturating_sub(1)
}

/// Split an A1 cell reference like `I7` into its letter and digit parts.
fn split_cell(cell: &str) -> (&str, &str) {
    let at = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    cell.split_at(at)
}

/// Drop trailing empty cells, matching how the spreadsheet API returns rows.
fn trim_trailing(mut row: Vec<String>) -> Vec<String> {
    while row.last().is_some_and(String::is_empty) {
        row.pop();
    }
    row
}

#[async_trait]
impl Adapter for MemoryBackend {
    fn name(&self) -> &str {
        "memory-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Tabular
    }

    async fn health_check(&self) -> Result<HealthStatus, FieldopsError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), FieldopsError> {
        Ok(())
    }
}

#[async_trait]
impl TabularBackend for MemoryBackend {
    async fn read_range(
        &self,
        sheet: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, FieldopsError> {
        if take_one(&self.fail_reads) {
            return Err(FieldopsError::Store {
                source: "injected read failure".into(),
            });
        }

        // Ranges are either whole-column (`A:F`) or row-bounded
        // (`A3:M3`); honor the column window in both cases.
        let (start, end) = match range.split_once(':') {
            Some(parts) => parts,
            None => (range, range),
        };
        let (start_col, start_row) = split_cell(start);
        let (end_col, _) = split_cell(end);
        let first_col = col_index(start_col);
        let width = col_index(end_col).saturating_sub(first_col) + 1;
        let skip = start_row.parse::<usize>().map_or(0, |r| r - 1);

        let tabs = self.lock_tabs();
        let rows = tabs
            .get(sheet)
            .map(|rows| {
                rows.iter()
                    .skip(skip)
                    .map(|row| {
                        let window: Vec<String> = row
                            .iter()
                            .skip(first_col)
                            .take(width)
                            .cloned()
                            .collect();
                        trim_trailing(window)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn append_row(
        &self,
        sheet: &str,
        _range: &str,
        row: Vec<String>,
    ) -> Result<(), FieldopsError> {
        // The append always lands; a dropped response only hides the
        // outcome from the caller.
        self.lock_tabs().entry(sheet.to_string()).or_default().push(row);
        if take_one(&self.drop_append_responses) {
            return Err(FieldopsError::Store {
                source: "injected append response loss".into(),
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
        if take_one(&self.fail_updates) {
            return Err(FieldopsError::Store {
                source: "injected update failure".into(),
            });
        }

        let start = range.split_once(':').map_or(range, |(s, _)| s);
        let (letters, digits) = split_cell(start);
        let first_col = col_index(letters);
        let first_row = digits.parse::<usize>().map_err(|_| FieldopsError::Store {
            source: format!("update range {range} has no row anchor").into(),
        })?;

        let mut tabs = self.lock_tabs();
        let tab = tabs.entry(sheet.to_string()).or_default();
        for (i, cells) in rows.into_iter().enumerate() {
            let row_idx = first_row - 1 + i;
            while tab.len() <= row_idx {
                tab.push(Vec::new());
            }
            let target = &mut tab[row_idx];
            for (j, cell) in cells.into_iter().enumerate() {
                let col_idx = first_col + j;
                while target.len() <= col_idx {
                    target.push(String::new());
                }
                target[col_idx] = cell;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let backend = MemoryBackend::new();
        backend
            .append_row("Employees", "A:E", row(&["U1", "Ana", "Tech", "idle", ""]))
            .await
            .unwrap();

        let rows = backend.read_range("Employees", "A:E").await.unwrap();
        assert_eq!(rows.len(), 1);
        // Trailing empty cells are trimmed, as the real API does.
        assert_eq!(rows[0], row(&["U1", "Ana", "Tech", "idle"]));
    }

    #[tokio::test]
    async fn update_range_overwrites_a_narrow_window() {
        let backend = MemoryBackend::new();
        backend.seed_rows(
            "Checkins",
            vec![row(&[
                "t1", "ts0", "U1", "Depot", "north", "", "", "", "ts0", "pending", "", "12.5", "Ana",
            ])],
        );

        backend
            .update_range("Checkins", "I1:J1", vec![row(&["ts1", "done"])])
            .await
            .unwrap();

        let rows = backend.rows("Checkins");
        assert_eq!(rows[0][8], "ts1");
        assert_eq!(rows[0][9], "done");
        assert_eq!(rows[0][0], "t1");
        assert_eq!(rows[0][12], "Ana");
    }

    #[tokio::test]
    async fn update_extends_short_rows_with_blanks() {
        let backend = MemoryBackend::new();
        backend.seed_rows("Checkins", vec![row(&["t1", "ts0"])]);

        backend
            .update_range("Checkins", "I1:J1", vec![row(&["ts1", "warning"])])
            .await
            .unwrap();

        let rows = backend.rows("Checkins");
        assert_eq!(rows[0].len(), 10);
        assert_eq!(rows[0][2], "");
        assert_eq!(rows[0][9], "warning");
    }

    #[tokio::test]
    async fn injected_read_failures_are_consumed() {
        let backend = MemoryBackend::new();
        backend.fail_next_reads(1);

        assert!(backend.read_range("Employees", "A:E").await.is_err());
        assert!(backend.read_range("Employees", "A:E").await.is_ok());
    }

    #[tokio::test]
    async fn dropped_append_response_still_lands() {
        let backend = MemoryBackend::new();
        backend.drop_next_append_responses(1);

        let result = backend
            .append_row("Submissions", "A:S", row(&["t9"]))
            .await;
        assert!(result.is_err());
        assert_eq!(backend.row_count("Submissions"), 1);
    }

    #[tokio::test]
    async fn row_bounded_read_skips_earlier_rows() {
        let backend = MemoryBackend::new();
        backend.seed_rows(
            "Locations",
            vec![row(&["name", "group"]), row(&["Depot", "north"])],
        );

        let rows = backend.read_range("Locations", "A2:F2").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Depot");
    }

    #[test]
    fn column_letters_map_to_indices() {
        assert_eq!(col_index("A"), 0);
        assert_eq!(col_index("I"), 8);
        assert_eq!(col_index("S"), 18);
        assert_eq!(col_index("AA"), 26);
    }
}
