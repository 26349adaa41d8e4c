// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row-store persistence layer for the Fieldops bot.
//!
//! This crate provides:
//! - [`records`]: typed [`Employee`] and [`TxnRecord`] rows with the sheet
//!   codecs (pad-to-width, timestamp format, status/state cells)
//! - [`RowStore`]: the bounded-time, retrying, idempotent adapter over a
//!   [`fieldops_core::TabularBackend`], with the employee TTL cache and the
//!   transaction row-index cache
//!
//! Everything above this crate works in typed records and never touches a
//! raw cell.

pub mod records;
pub mod store;

pub use records::{
    format_timestamp, image_col_letter, now_timestamp, parse_timestamp, Employee, TxnRecord,
    CHECKIN_WIDTH, EMPLOYEE_WIDTH, SHEET_TS_FORMAT, SUBMISSION_WIDTH,
};
pub use store::RowStore;
