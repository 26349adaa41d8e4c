// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tabular row-store trait for the spreadsheet-backed persistence layer.

use async_trait::async_trait;

use crate::error::FieldopsError;
use crate::traits::adapter::Adapter;

/// Adapter for a range-addressed tabular store (spreadsheet tabs).
///
/// Operations are keyed by sheet (tab) name plus an A1-style range. Cells are
/// strings; typed record codecs live one layer up in `fieldops-store`. The
/// backend is eventually consistent and rate limited; callers own timeouts
/// and retries.
#[async_trait]
pub trait TabularBackend: Adapter {
    /// Reads a range of cells. Rows may be ragged (trailing empty cells are
    /// omitted by the backend); callers normalize width.
    async fn read_range(&self, sheet: &str, range: &str)
    -> Result<Vec<Vec<String>>, FieldopsError>;

    /// Appends one row after the last non-empty row of the ranged region.
    async fn append_row(
        &self,
        sheet: &str,
        range: &str,
        row: Vec<String>,
    ) -> Result<(), FieldopsError>;

    /// Overwrites the cells of the given range with the given rows.
    async fn update_range(
        &self,
        sheet: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), FieldopsError>;
}
