// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-transaction lock registry.
//!
//! Every read-modify-write sequence on a transaction row (slot assignment,
//! status transitions, finalize) serializes on the transaction's lock, so
//! two images arriving back to back can never claim the same slot and a
//! sweep can never clobber a write in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use fieldops_core::TransactionId;

/// Registry of per-transaction mutexes, created lazily and never removed.
/// Growth is bounded by the number of transactions seen in one process
/// lifetime.
pub struct TxnLocks {
    locks: DashMap<TransactionId, Arc<Mutex<()>>>,
}

impl TxnLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// The lock for a transaction id, creating it on first use. Callers
    /// clone the `Arc` out so the map shard is not held while waiting.
    pub fn acquire(&self, id: &TransactionId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for TxnLocks {
    fn default() -> Self {
        Self::new()
    }
}
