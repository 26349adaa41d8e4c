// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Packed location metadata parser.
//!
//! The GPS capture page smuggles its context through the location
//! message's free-text address as `(txn=<uuid>|acc=<meters>|ts=<epoch-ms>)`,
//! appended after the human-readable part. All three fields are required;
//! a missing or unparseable field invalidates the whole block.

use std::time::Duration;

use fieldops_core::TransactionId;

/// Validated metadata carried by a capture-page location fix.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMeta {
    /// Transaction this fix belongs to.
    pub txn: TransactionId,
    /// Reported GPS accuracy radius in meters.
    pub accuracy_m: f64,
    /// Capture timestamp in epoch milliseconds, from the device clock.
    pub captured_at_ms: i64,
}

impl LocationMeta {
    /// Parse the packed block out of an address string.
    ///
    /// The block is the first `(` ... `)` span; `key=value` pairs are split
    /// on `|`, unknown keys and fragments without `=` are ignored. Returns
    /// `None` when the block or any of the three fields is absent or
    /// malformed.
    pub fn parse(address: &str) -> Option<Self> {
        let open = address.find('(')?;
        let close = open + 1 + address[open + 1..].find(')')?;
        let block = &address[open + 1..close];

        let mut txn: Option<&str> = None;
        let mut acc: Option<f64> = None;
        let mut ts: Option<i64> = None;
        for fragment in block.split('|') {
            let Some((key, value)) = fragment.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "txn" if !value.is_empty() => txn = Some(value),
                "acc" => acc = value.parse().ok(),
                "ts" => ts = value.parse().ok(),
                _ => {}
            }
        }

        Some(Self {
            txn: TransactionId(txn?.to_string()),
            accuracy_m: acc?,
            captured_at_ms: ts?,
        })
    }

    /// Whether the fix is recent enough relative to `now_ms`.
    ///
    /// A fix from the future fails too: the device clock cannot be ahead of
    /// the server by more than ordinary skew, and trusting it would defeat
    /// the staleness check.
    pub fn is_fresh(&self, now_ms: i64, max_age: Duration) -> bool {
        let age_ms = now_ms - self.captured_at_ms;
        age_ms >= 0 && age_ms <= max_age.as_millis() as i64
    }
}
