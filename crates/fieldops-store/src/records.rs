// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed records and row codecs for the Employees, Checkins and Submissions
//! sheets.
//!
//! Sheets return ragged rows (trailing empty cells omitted), so every codec
//! pads to the collection's minimum width exactly once here. Business logic
//! upstream never indexes a raw row.

use chrono::{DateTime, NaiveDateTime, Utc};
use fieldops_core::{EmployeeState, FlowKind, TransactionId, TxnStatus, UserId};

/// Timestamp format used in every sheet cell.
pub const SHEET_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column count of an Employees row (A:E).
pub const EMPLOYEE_WIDTH: usize = 5;
/// Column count of a Checkins row (A:M).
pub const CHECKIN_WIDTH: usize = 13;
/// Column count of a Submissions row (A:S).
pub const SUBMISSION_WIDTH: usize = 19;

/// 0-based column indices shared by both transaction sheets.
pub mod col {
    pub const ID: usize = 0;
    pub const CREATED_AT: usize = 1;
    pub const USER_ID: usize = 2;
    pub const SITE_NAME: usize = 3;
    pub const SITE_GROUP: usize = 4;
    /// First of the three image URL columns (F..H).
    pub const IMAGE_FIRST: usize = 5;
    pub const LAST_UPDATED_AT: usize = 8;
    pub const STATUS: usize = 9;
    pub const WARNING_SENT: usize = 10;
    pub const DISTANCE_M: usize = 11;
    pub const EMPLOYEE_NAME: usize = 12;
    /// First of the three hash columns, Submissions only (N..P).
    pub const HASH_FIRST: usize = 13;
    /// First of the three duplicate-reference columns, Submissions only (Q..S).
    pub const DUP_REF_FIRST: usize = 16;
}

/// Format a timestamp for a sheet cell.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(SHEET_TS_FORMAT).to_string()
}

/// Current time formatted for a sheet cell.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a sheet timestamp cell. `None` for empty or malformed cells.
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(cell.trim(), SHEET_TS_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

/// Pad a row with empty cells to at least `width`.
pub fn pad_row(row: &mut Vec<String>, width: usize) {
    while row.len() < width {
        row.push(String::new());
    }
}

/// Sheet column letter of an image slot (0 -> F, 1 -> G, 2 -> H), used in
/// human-readable duplicate references.
pub fn image_col_letter(slot: usize) -> char {
    match slot {
        0 => 'F',
        1 => 'G',
        2 => 'H',
        _ => '?',
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn opt_cell(row: &[String], idx: usize) -> Option<String> {
    match cell(row, idx) {
        "" => None,
        s => Some(s.to_string()),
    }
}

/// One registered employee, mirroring an Employees row.
#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    pub user_id: UserId,
    pub name: String,
    pub position: String,
    pub state: EmployeeState,
    pub transaction_id: Option<TransactionId>,
}

impl Employee {
    /// A freshly registered employee in the idle state.
    pub fn new(user_id: UserId, name: String, position: String) -> Self {
        Self {
            user_id,
            name,
            position,
            state: EmployeeState::Idle,
            transaction_id: None,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.user_id.0.clone(),
            self.name.clone(),
            self.position.clone(),
            self.state.to_string(),
            self.transaction_id
                .as_ref()
                .map(|t| t.0.clone())
                .unwrap_or_default(),
        ]
    }

    /// Decode an Employees row. `None` when the user id cell is empty
    /// (blank or separator rows in the sheet).
    pub fn from_row(row: &[String]) -> Option<Self> {
        let user_id = cell(row, 0).trim();
        if user_id.is_empty() {
            return None;
        }
        Some(Self {
            user_id: UserId(user_id.to_string()),
            name: cell(row, 1).to_string(),
            position: cell(row, 2).to_string(),
            state: EmployeeState::from_cell(cell(row, 3)),
            transaction_id: opt_cell(row, 4).map(TransactionId),
        })
    }
}

/// One transaction record, mirroring a Checkins or Submissions row.
///
/// The two collections share the A:M layout; submissions extend it with
/// slot-aligned hash (N..P) and duplicate-reference (Q..S) columns, which
/// stay empty (and unwritten) for check-ins.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnRecord {
    pub flow: FlowKind,
    pub id: TransactionId,
    pub created_at: String,
    pub user_id: UserId,
    pub site_name: String,
    pub site_group: String,
    pub image_urls: [Option<String>; 3],
    pub last_updated_at: String,
    pub status: TxnStatus,
    pub warning_sent: bool,
    pub distance_m: f64,
    pub employee_name: String,
    pub hashes: [Option<String>; 3],
    pub dup_refs: [Option<String>; 3],
}

impl TxnRecord {
    /// A new record as persisted the moment a location is accepted.
    pub fn new(
        flow: FlowKind,
        id: TransactionId,
        user_id: UserId,
        site_name: String,
        site_group: String,
        distance_m: f64,
        employee_name: String,
    ) -> Self {
        let ts = now_timestamp();
        Self {
            flow,
            id,
            created_at: ts.clone(),
            user_id,
            site_name,
            site_group,
            image_urls: Default::default(),
            last_updated_at: ts,
            status: TxnStatus::Pending,
            warning_sent: false,
            distance_m,
            employee_name,
            hashes: Default::default(),
            dup_refs: Default::default(),
        }
    }

    /// Row width of this record's collection.
    pub fn width(&self) -> usize {
        match self.flow {
            FlowKind::Checkin => CHECKIN_WIDTH,
            FlowKind::Submission => SUBMISSION_WIDTH,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.id.0.clone(),
            self.created_at.clone(),
            self.user_id.0.clone(),
            self.site_name.clone(),
            self.site_group.clone(),
        ];
        for url in &self.image_urls {
            row.push(url.clone().unwrap_or_default());
        }
        row.push(self.last_updated_at.clone());
        row.push(self.status.to_string());
        row.push(if self.warning_sent { "1".into() } else { String::new() });
        row.push(self.distance_m.to_string());
        row.push(self.employee_name.clone());
        if self.flow == FlowKind::Submission {
            for h in &self.hashes {
                row.push(h.clone().unwrap_or_default());
            }
            for d in &self.dup_refs {
                row.push(d.clone().unwrap_or_default());
            }
        }
        pad_row(&mut row, self.width());
        row
    }

    /// Decode a transaction row. `None` when the id cell is empty.
    pub fn from_row(flow: FlowKind, row: &[String]) -> Option<Self> {
        let id = cell(row, col::ID).trim();
        if id.is_empty() {
            return None;
        }
        let image_urls = [
            opt_cell(row, col::IMAGE_FIRST),
            opt_cell(row, col::IMAGE_FIRST + 1),
            opt_cell(row, col::IMAGE_FIRST + 2),
        ];
        let (hashes, dup_refs) = if flow == FlowKind::Submission {
            (
                [
                    opt_cell(row, col::HASH_FIRST),
                    opt_cell(row, col::HASH_FIRST + 1),
                    opt_cell(row, col::HASH_FIRST + 2),
                ],
                [
                    opt_cell(row, col::DUP_REF_FIRST),
                    opt_cell(row, col::DUP_REF_FIRST + 1),
                    opt_cell(row, col::DUP_REF_FIRST + 2),
                ],
            )
        } else {
            (Default::default(), Default::default())
        };
        Some(Self {
            flow,
            id: TransactionId(id.to_string()),
            created_at: cell(row, col::CREATED_AT).to_string(),
            user_id: UserId(cell(row, col::USER_ID).to_string()),
            site_name: cell(row, col::SITE_NAME).to_string(),
            site_group: cell(row, col::SITE_GROUP).to_string(),
            image_urls,
            last_updated_at: cell(row, col::LAST_UPDATED_AT).to_string(),
            status: TxnStatus::from_cell(cell(row, col::STATUS)),
            warning_sent: parse_flag(cell(row, col::WARNING_SENT)),
            distance_m: cell(row, col::DISTANCE_M).trim().parse().unwrap_or(0.0),
            employee_name: cell(row, col::EMPLOYEE_NAME).to_string(),
            hashes,
            dup_refs,
        })
    }

    /// Count of filled image slots.
    pub fn filled_count(&self) -> usize {
        self.image_urls.iter().filter(|u| u.is_some()).count()
    }

    /// Index of the first empty image slot, left to right.
    pub fn first_empty_slot(&self) -> Option<usize> {
        self.image_urls.iter().position(|u| u.is_none())
    }

    /// The timestamp the timeout clock runs against: `last_updated_at`,
    /// falling back to `created_at` when unparseable.
    pub fn last_touch(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.last_updated_at).or_else(|| parse_timestamp(&self.created_at))
    }
}

fn parse_flag(cell: &str) -> bool {
    matches!(cell.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn employee_row_round_trip() {
        let emp = Employee {
            user_id: UserId("U123".into()),
            name: "Ann".into(),
            position: "Technician".into(),
            state: EmployeeState::WaitingForCheckinImages,
            transaction_id: Some(TransactionId("txn-1".into())),
        };
        let row = emp.to_row();
        assert_eq!(row.len(), EMPLOYEE_WIDTH);
        assert_eq!(row[3], "waiting_for_checkin_images");
        assert_eq!(Employee::from_row(&row), Some(emp));
    }

    #[test]
    fn employee_from_ragged_row() {
        // Sheet drops trailing empty cells; a fresh idle employee comes back
        // as a 3-cell row.
        let emp = Employee::from_row(&strs(&["U1", "Ann", "Tech"])).unwrap();
        assert_eq!(emp.state, EmployeeState::Idle);
        assert_eq!(emp.transaction_id, None);
    }

    #[test]
    fn employee_blank_row_is_none() {
        assert_eq!(Employee::from_row(&strs(&["", "x"])), None);
        assert_eq!(Employee::from_row(&[]), None);
    }

    #[test]
    fn checkin_row_is_thirteen_columns() {
        let rec = TxnRecord::new(
            FlowKind::Checkin,
            TransactionId("t1".into()),
            UserId("U1".into()),
            "Depot".into(),
            "North".into(),
            42.5,
            "Ann".into(),
        );
        let row = rec.to_row();
        assert_eq!(row.len(), CHECKIN_WIDTH);
        assert_eq!(row[col::STATUS], "pending");
        assert_eq!(row[col::WARNING_SENT], "");
        assert_eq!(row[col::DISTANCE_M], "42.5");
        assert_eq!(row[col::EMPLOYEE_NAME], "Ann");
    }

    #[test]
    fn submission_row_is_nineteen_columns() {
        let mut rec = TxnRecord::new(
            FlowKind::Submission,
            TransactionId("t2".into()),
            UserId("U1".into()),
            "Depot".into(),
            String::new(),
            0.0,
            "Ann".into(),
        );
        rec.hashes[0] = Some("a1b2c3d4e5f60718".into());
        rec.dup_refs[1] = Some("row 7 col G".into());
        let row = rec.to_row();
        assert_eq!(row.len(), SUBMISSION_WIDTH);
        assert_eq!(row[col::HASH_FIRST], "a1b2c3d4e5f60718");
        assert_eq!(row[col::DUP_REF_FIRST + 1], "row 7 col G");
    }

    #[test]
    fn txn_row_round_trip() {
        let mut rec = TxnRecord::new(
            FlowKind::Submission,
            TransactionId("t3".into()),
            UserId("U9".into()),
            "Depot".into(),
            "South".into(),
            12.25,
            "Bo".into(),
        );
        rec.image_urls[0] = Some("https://example.com/1.jpg".into());
        rec.status = TxnStatus::InProgress;
        rec.warning_sent = true;
        let decoded = TxnRecord::from_row(FlowKind::Submission, &rec.to_row()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn txn_from_ragged_row_pads() {
        // A row written before any image arrived may be cut at column E.
        let rec =
            TxnRecord::from_row(FlowKind::Checkin, &strs(&["t4", "", "U1", "Site", "G"])).unwrap();
        assert_eq!(rec.filled_count(), 0);
        assert_eq!(rec.status, TxnStatus::Pending);
        assert!(!rec.warning_sent);
    }

    #[test]
    fn slot_helpers() {
        let mut rec = TxnRecord::new(
            FlowKind::Checkin,
            TransactionId("t5".into()),
            UserId("U1".into()),
            String::new(),
            String::new(),
            0.0,
            String::new(),
        );
        assert_eq!(rec.first_empty_slot(), Some(0));
        rec.image_urls[0] = Some("u1".into());
        rec.image_urls[1] = Some("u2".into());
        assert_eq!(rec.first_empty_slot(), Some(2));
        assert_eq!(rec.filled_count(), 2);
        rec.image_urls[2] = Some("u3".into());
        assert_eq!(rec.first_empty_slot(), None);
    }

    #[test]
    fn timestamp_codec() {
        let ts = parse_timestamp("2026-08-25 13:45:00").unwrap();
        assert_eq!(format_timestamp(ts), "2026-08-25 13:45:00");
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn last_touch_falls_back_to_created_at() {
        let mut rec = TxnRecord::new(
            FlowKind::Checkin,
            TransactionId("t6".into()),
            UserId("U1".into()),
            String::new(),
            String::new(),
            0.0,
            String::new(),
        );
        rec.created_at = "2026-08-25 10:00:00".into();
        rec.last_updated_at = "not a timestamp".into();
        assert_eq!(
            rec.last_touch(),
            parse_timestamp("2026-08-25 10:00:00"),
        );
    }

    #[test]
    fn image_column_letters() {
        assert_eq!(image_col_letter(0), 'F');
        assert_eq!(image_col_letter(1), 'G');
        assert_eq!(image_col_letter(2), 'H');
    }

    #[test]
    fn warning_flag_codec() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("0"));
    }
}
