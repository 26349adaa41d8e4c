// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image intake: prepare, upload, slot assignment, duplicate audit.
//!
//! The decode/resize/re-encode half lives in `fieldops-imaging`; this
//! module owns everything stateful. Upload happens before the row is
//! touched, so a failed upload leaves the sheet untouched, and the row
//! read-modify-write runs under the per-transaction lock so concurrent
//! images serialize onto distinct slots.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldops_config::model::ImageConfig;
use fieldops_core::{FieldopsError, FlowKind, MediaStore, TransactionId};
use fieldops_imaging::{average_hash_hex, prepare_image};
use fieldops_store::{image_col_letter, now_timestamp, RowStore};

use crate::locks::TxnLocks;
use crate::machine::advance_on_image;
use crate::metrics;

/// Result of one ingested image.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeOutcome {
    /// 1-based sheet row of the transaction record.
    pub row_index: usize,
    /// Image slots occupied after this ingest, 0..=3.
    pub filled: usize,
    /// `row {N} col {F|G|H}` of an earlier submission with identical
    /// content, when one exists. Audit trail only.
    pub duplicate_note: Option<String>,
}

/// Why an ingest failed, split by the corrective message the user needs.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The bytes would not decode or re-encode.
    #[error("image preparation failed: {0}")]
    Prepare(#[source] FieldopsError),
    /// The media store is not configured or authorized.
    #[error("media store is not connected")]
    StorageNotConnected,
    /// The upload itself failed; nothing was written.
    #[error("image upload failed: {0}")]
    Upload(#[source] FieldopsError),
    /// The transaction row that must exist from the location step is gone.
    #[error("transaction row not found")]
    RowMissing,
    /// The row could not be read or written back.
    #[error("transaction row write failed: {0}")]
    RowWrite(#[source] FieldopsError),
}

pub struct ImageIntake {
    store: Arc<RowStore>,
    media: Arc<dyn MediaStore>,
    locks: Arc<TxnLocks>,
    config: ImageConfig,
}

impl ImageIntake {
    pub fn new(
        store: Arc<RowStore>,
        media: Arc<dyn MediaStore>,
        locks: Arc<TxnLocks>,
        config: ImageConfig,
    ) -> Self {
        Self {
            store,
            media,
            locks,
            config,
        }
    }

    /// Run one raw image through the full pipeline and record it on the
    /// transaction row.
    pub async fn ingest(
        &self,
        txn: &TransactionId,
        raw: &[u8],
        flow: FlowKind,
    ) -> Result<IntakeOutcome, IntakeError> {
        let quality = match flow {
            FlowKind::Checkin => self.config.checkin_quality,
            FlowKind::Submission => self.config.submission_quality,
        };
        let prepared = prepare_image(raw, self.config.max_dimension_px, quality)
            .map_err(IntakeError::Prepare)?;

        // The submission hash fingerprints the bytes that are actually
        // stored, not the original upload.
        let hash = match flow {
            FlowKind::Submission => {
                Some(average_hash_hex(&prepared).map_err(IntakeError::Prepare)?)
            }
            FlowKind::Checkin => None,
        };

        if !self.media.is_ready() {
            return Err(IntakeError::StorageNotConnected);
        }
        let file_name = format!("{flow}_image_{txn}_{}.jpg", Uuid::new_v4());
        let url = self
            .media
            .upload_jpeg(&file_name, prepared)
            .await
            .map_err(IntakeError::Upload)?;
        debug!(txn_id = %txn, flow = %flow, file_name = %file_name, "image uploaded");

        let lock = self.locks.acquire(txn);
        let _held = lock.lock().await;

        let Some((mut record, idx)) = self
            .store
            .find_txn(flow, txn)
            .await
            .map_err(IntakeError::RowWrite)?
        else {
            // The row is created at the location step; fabricating one here
            // would zero out the recorded distance.
            return Err(IntakeError::RowMissing);
        };

        let now = now_timestamp();
        let Some(slot) = record.first_empty_slot() else {
            // All three slots hold URLs already; the late image only
            // refreshes the touch time.
            record.last_updated_at = now;
            self.store
                .update_txn_row(flow, idx, &record)
                .await
                .map_err(IntakeError::RowWrite)?;
            return Ok(IntakeOutcome {
                row_index: idx,
                filled: 3,
                duplicate_note: None,
            });
        };

        record.image_urls[slot] = Some(url);
        record.last_updated_at = now;
        record.status = advance_on_image(record.status);

        let mut duplicate_note = None;
        if let Some(hash) = hash {
            record.hashes[slot] = Some(hash.clone());
            duplicate_note = self.find_duplicate(txn, &hash).await;
            if let Some(note) = &duplicate_note {
                record.dup_refs[slot] = Some(note.clone());
            }
        }

        self.store
            .update_txn_row(flow, idx, &record)
            .await
            .map_err(IntakeError::RowWrite)?;

        metrics::record_image_ingested(flow);
        let filled = record.filled_count();
        info!(txn_id = %txn, flow = %flow, slot, filled, "image recorded");
        Ok(IntakeOutcome {
            row_index: idx,
            filled,
            duplicate_note,
        })
    }

    /// First earlier submission carrying the same hash in any slot.
    ///
    /// Advisory: a failed scan only loses the note, never the upload.
    async fn find_duplicate(&self, own: &TransactionId, hash: &str) -> Option<String> {
        let rows = match self.store.read_txns(FlowKind::Submission).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(txn_id = %own, error = %e, "duplicate scan failed, skipping the note");
                return None;
            }
        };
        for (record, idx) in rows {
            if record.id == *own {
                continue;
            }
            for (slot, stored) in record.hashes.iter().enumerate() {
                if let Some(stored) = stored {
                    if stored.trim().eq_ignore_ascii_case(hash) {
                        return Some(format!("row {idx} col {}", image_col_letter(slot)));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_config::model::SheetsConfig;
    use fieldops_core::{TxnStatus, UserId};
    use fieldops_store::TxnRecord;
    use fieldops_test_utils::images::{flat_jpeg, split_jpeg};
    use fieldops_test_utils::{MemoryBackend, MockMediaStore};

    fn intake_over(
        backend: Arc<MemoryBackend>,
        media: Arc<MockMediaStore>,
    ) -> (ImageIntake, Arc<RowStore>) {
        let config = SheetsConfig {
            execute_timeout_s: 2,
            quick_timeout_s: 1,
            max_attempts: 2,
            backoff_base_s: 0.01,
            ..Default::default()
        };
        let store = Arc::new(RowStore::new(backend, &config));
        let intake = ImageIntake::new(
            store.clone(),
            media,
            Arc::new(TxnLocks::new()),
            ImageConfig::default(),
        );
        (intake, store)
    }

    async fn seed_txn(store: &RowStore, flow: FlowKind, id: &str) -> TransactionId {
        let txn = TransactionId(id.to_string());
        let record = TxnRecord::new(
            flow,
            txn.clone(),
            UserId("U1".to_string()),
            "Depot".to_string(),
            "north".to_string(),
            12.5,
            "Ann".to_string(),
        );
        store.upsert_txn(&record).await.unwrap();
        txn
    }

    #[tokio::test]
    async fn slots_fill_left_to_right() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media.clone());
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        for expected in 1..=3 {
            let outcome = intake
                .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
                .await
                .unwrap();
            assert_eq!(outcome.filled, expected);
        }

        let (record, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        assert!(record.image_urls.iter().all(Option::is_some));
        assert_eq!(record.status, TxnStatus::InProgress);
        assert!(record.hashes.iter().all(Option::is_none));
        assert_eq!(media.upload_count().await, 3);
    }

    #[tokio::test]
    async fn fourth_image_only_refreshes_the_touch_time() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media);
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        for _ in 0..3 {
            intake
                .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
                .await
                .unwrap();
        }
        let (before, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();

        let outcome = intake
            .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
            .await
            .unwrap();
        assert_eq!(outcome.filled, 3);

        let (after, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        assert_eq!(after.image_urls, before.image_urls);
        assert_eq!(after.status, before.status);
    }

    #[tokio::test]
    async fn recorded_url_round_trips_from_the_upload() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media.clone());
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        intake
            .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
            .await
            .unwrap();

        let uploads = media.uploads().await;
        let (record, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        assert_eq!(record.image_urls[0].as_deref(), Some(uploads[0].url.as_str()));
        assert!(uploads[0].file_name.starts_with("checkin_image_t1_"));
        assert!(uploads[0].file_name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn submission_hash_lands_slot_aligned_and_flags_duplicates() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media);
        let first = seed_txn(&store, FlowKind::Submission, "s1").await;
        let second = seed_txn(&store, FlowKind::Submission, "s2").await;

        let photo = split_jpeg(64, 64, true);
        let original = intake
            .ingest(&first, &photo, FlowKind::Submission)
            .await
            .unwrap();
        assert_eq!(original.duplicate_note, None);

        let duplicate = intake
            .ingest(&second, &photo, FlowKind::Submission)
            .await
            .unwrap();
        assert_eq!(duplicate.duplicate_note.as_deref(), Some("row 1 col F"));

        let (first_rec, _) = store.find_txn(FlowKind::Submission, &first).await.unwrap().unwrap();
        let (second_rec, _) = store.find_txn(FlowKind::Submission, &second).await.unwrap().unwrap();
        assert!(first_rec.hashes[0].is_some());
        assert_eq!(first_rec.dup_refs[0], None);
        assert_eq!(second_rec.hashes[0], first_rec.hashes[0]);
        assert_eq!(second_rec.dup_refs[0].as_deref(), Some("row 1 col F"));
    }

    #[tokio::test]
    async fn distinct_content_carries_no_duplicate_note() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media);
        let first = seed_txn(&store, FlowKind::Submission, "s1").await;
        let second = seed_txn(&store, FlowKind::Submission, "s2").await;

        intake
            .ingest(&first, &split_jpeg(64, 64, true), FlowKind::Submission)
            .await
            .unwrap();
        let outcome = intake
            .ingest(&second, &split_jpeg(64, 64, false), FlowKind::Submission)
            .await
            .unwrap();
        assert_eq!(outcome.duplicate_note, None);
    }

    #[tokio::test]
    async fn missing_row_is_an_error_for_both_flows() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, _store) = intake_over(backend.clone(), media);
        let txn = TransactionId("ghost".to_string());

        for flow in [FlowKind::Checkin, FlowKind::Submission] {
            let err = intake
                .ingest(&txn, &flat_jpeg(64, 64, 90), flow)
                .await
                .unwrap_err();
            assert!(matches!(err, IntakeError::RowMissing));
        }
        assert_eq!(backend.row_count("Checkins"), 0);
        assert_eq!(backend.row_count("Submissions"), 0);
    }

    #[tokio::test]
    async fn offline_media_store_blocks_before_upload() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::offline());
        let (intake, store) = intake_over(backend, media.clone());
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        let err = intake
            .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::StorageNotConnected));
        assert_eq!(media.upload_count().await, 0);
    }

    #[tokio::test]
    async fn failed_upload_leaves_the_row_untouched() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media.clone());
        let txn = seed_txn(&store, FlowKind::Submission, "s1").await;
        media.fail_next_uploads(1);

        let err = intake
            .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Submission)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Upload(_)));

        let (record, _) = store.find_txn(FlowKind::Submission, &txn).await.unwrap().unwrap();
        assert_eq!(record.filled_count(), 0);
        assert_eq!(record.status, TxnStatus::Pending);
    }

    #[tokio::test]
    async fn undecodable_bytes_never_reach_the_store() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media.clone());
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        let err = intake
            .ingest(&txn, b"not an image", FlowKind::Checkin)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Prepare(_)));
        assert_eq!(media.upload_count().await, 0);
    }

    #[tokio::test]
    async fn late_image_never_reopens_a_terminal_row() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media);
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        let (mut record, idx) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        record.status = TxnStatus::Done;
        store.update_txn_row(FlowKind::Checkin, idx, &record).await.unwrap();

        let outcome = intake
            .ingest(&txn, &flat_jpeg(64, 64, 90), FlowKind::Checkin)
            .await
            .unwrap();
        assert_eq!(outcome.filled, 1);

        let (after, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        assert_eq!(after.status, TxnStatus::Done);
        assert!(after.image_urls[0].is_some());
    }

    #[tokio::test]
    async fn concurrent_images_fill_distinct_slots() {
        let backend = Arc::new(MemoryBackend::new());
        let media = Arc::new(MockMediaStore::new());
        let (intake, store) = intake_over(backend, media);
        let intake = Arc::new(intake);
        let txn = seed_txn(&store, FlowKind::Checkin, "t1").await;

        let a = {
            let intake = intake.clone();
            let txn = txn.clone();
            let bytes = split_jpeg(64, 64, true);
            tokio::spawn(async move { intake.ingest(&txn, &bytes, FlowKind::Checkin).await })
        };
        let b = {
            let intake = intake.clone();
            let txn = txn.clone();
            let bytes = split_jpeg(64, 64, false);
            tokio::spawn(async move { intake.ingest(&txn, &bytes, FlowKind::Checkin).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let (record, _) = store.find_txn(FlowKind::Checkin, &txn).await.unwrap().unwrap();
        assert_eq!(record.filled_count(), 2);
        assert!(record.image_urls[0].is_some());
        assert!(record.image_urls[1].is_some());
        assert_ne!(record.image_urls[0], record.image_urls[1]);
        assert!(record.image_urls[2].is_none());
    }
}
