// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counter recording helpers on the `metrics` facade.
//!
//! Only the facade is used here; installing a recorder/exporter is a
//! deployment concern. Without one these calls are no-ops.

use metrics::counter;

use fieldops_core::{FlowKind, TxnStatus};

/// One inbound event entered a handler.
pub fn record_event(kind: &str) {
    counter!("fieldops_events_total", "kind" => kind.to_string()).increment(1);
}

/// One image made it through the intake pipeline onto a row.
pub fn record_image_ingested(flow: FlowKind) {
    counter!("fieldops_images_ingested_total", "flow" => flow.to_string()).increment(1);
}

/// A transaction reached a terminal status.
pub fn record_finalized(flow: FlowKind, status: TxnStatus) {
    counter!(
        "fieldops_transactions_finalized_total",
        "flow" => flow.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// One background sweep cycle ran to completion.
pub fn record_sweep_cycle() {
    counter!("fieldops_sweep_cycles_total").increment(1);
}

/// The sweeper timed out an overdue transaction.
pub fn record_sweep_timeout(flow: FlowKind) {
    counter!("fieldops_sweep_timeouts_total", "flow" => flow.to_string()).increment(1);
}
