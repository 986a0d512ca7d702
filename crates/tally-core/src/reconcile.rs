//! Reconciliation pipeline
//!
//! Classifies every row of a batch into exactly one outcome:
//! - `Failed` - date or amount could not be normalized, or a store call failed
//! - `ExactDuplicate` - the fingerprint is already in the ledger
//! - `PreviouslyDiscarded` - a human already judged this candidate a duplicate
//! - `PendingConfirmation` - a near-duplicate exists; a human has to decide
//! - `Inserted` - admitted into the ledger
//!
//! Rows run strictly in order so later rows see the records earlier rows
//! inserted.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{ExternalIdMatching, ReconcileConfig};
use crate::db::{Database, InsertOutcome};
use crate::error::Result;
use crate::fingerprint;
use crate::matcher::Matcher;
use crate::models::{
    Batch, BatchResult, Candidate, PendingMatch, RowOutcome, RowReport, TransactionRecord,
};
use crate::notify::NotificationSink;

/// What happened to a row that made it past normalization
enum Decision {
    Inserted(TransactionRecord),
    Pending(PendingMatch),
    ExactDuplicate,
    PreviouslyDiscarded,
}

/// Runs batches against the ledger
pub struct Reconciler<'a> {
    db: &'a Database,
    config: &'a ReconcileConfig,
    sink: Option<&'a dyn NotificationSink>,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database, config: &'a ReconcileConfig) -> Self {
        Self {
            db,
            config,
            sink: None,
        }
    }

    /// Hand inserted records to `sink` once per batch
    pub fn with_sink(mut self, sink: &'a dyn NotificationSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Reconcile a batch
    ///
    /// Only an unreachable store is an error; everything row-local ends up in
    /// the per-row report and the counts.
    pub fn reconcile(&self, batch: &Batch) -> Result<BatchResult> {
        self.db.ping()?;

        let source = batch.source.as_deref();
        info!(
            "Reconciling {} row(s) from {}",
            batch.rows.len(),
            source.unwrap_or("batch")
        );

        let batch_id = match self.db.create_batch(source, batch.rows.len()) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to record batch history: {}", e);
                None
            }
        };

        let mut result = BatchResult {
            batch_id,
            source: batch.source.clone(),
            ..Default::default()
        };

        for (index, row) in batch.rows.iter().enumerate() {
            let candidate = match fingerprint::normalize(row) {
                Ok(c) => c,
                Err(e) => {
                    debug!("Row {} rejected: {}", index, e);
                    result.record(RowReport {
                        index,
                        fingerprint: None,
                        outcome: RowOutcome::Failed,
                        detail: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let fp = candidate.fingerprint.clone();
            let (outcome, detail) = match self.decide(candidate) {
                Ok(Decision::Inserted(record)) => {
                    result.inserted.push(record);
                    (RowOutcome::Inserted, None)
                }
                Ok(Decision::Pending(pending)) => {
                    result.pending_matches.push(pending);
                    (RowOutcome::PendingConfirmation, None)
                }
                Ok(Decision::ExactDuplicate) => (RowOutcome::ExactDuplicate, None),
                Ok(Decision::PreviouslyDiscarded) => (RowOutcome::PreviouslyDiscarded, None),
                Err(e) => {
                    warn!("Row {} ({}) failed: {}", index, fp, e);
                    (RowOutcome::Failed, Some(e.to_string()))
                }
            };

            debug!("Row {} ({}): {}", index, fp, outcome);
            result.record(RowReport {
                index,
                fingerprint: Some(fp),
                outcome,
                detail,
            });
        }

        if let Some(id) = batch_id {
            if let Err(e) = self.db.complete_batch(id, &result) {
                warn!("Failed to finalize batch {}: {}", id, e);
            }
        }

        if !result.inserted.is_empty() {
            if let Some(sink) = self.sink {
                if let Err(e) = sink.notify(source, &result.inserted) {
                    warn!("Notification failed: {}", e);
                }
            }
        }

        info!(
            "Batch done: {} inserted, {} pending, {} duplicate, {} previously discarded, {} failed",
            result.inserted_count,
            result.pending_count,
            result.exact_duplicate_count,
            result.previously_discarded_count,
            result.failed_count
        );

        Ok(result)
    }

    fn decide(&self, candidate: Candidate) -> Result<Decision> {
        if self.db.exists(&candidate.fingerprint)? {
            return Ok(Decision::ExactDuplicate);
        }

        if self.db.was_discarded(&candidate.fingerprint)? {
            return Ok(Decision::PreviouslyDiscarded);
        }

        if self.fuzzy_matching_applies(&candidate) {
            let matcher = Matcher::new(self.db, self.config);
            if let Some(near) =
                matcher.find_match(candidate.amount, candidate.date, &candidate.description)?
            {
                return Ok(Decision::Pending(PendingMatch {
                    candidate,
                    existing_match: near.record,
                    similarity: near.similarity,
                    detected_at: Utc::now(),
                }));
            }
        }

        let record = candidate.into_record(Utc::now());
        match self.db.insert(&record)? {
            InsertOutcome::Inserted => Ok(Decision::Inserted(record)),
            // Another batch got there first
            InsertOutcome::AlreadyExists => Ok(Decision::ExactDuplicate),
        }
    }

    fn fuzzy_matching_applies(&self, candidate: &Candidate) -> bool {
        match self.config.external_id_matching {
            ExternalIdMatching::Fuzzy => true,
            ExternalIdMatching::ExactOnly => !candidate.has_external_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{BatchStatus, CandidateRow};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(Option<String>, usize)>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, source: Option<&str>, inserted: &[TransactionRecord]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((source.map(String::from), inserted.len()));
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn notify(&self, _source: Option<&str>, _inserted: &[TransactionRecord]) -> Result<()> {
            Err(Error::Config("smtp not configured".to_string()))
        }
    }

    fn row(date: &str, description: &str, amount: &str) -> CandidateRow {
        CandidateRow::new(date, description, amount)
    }

    #[test]
    fn test_inserts_new_rows() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Coffee", "-3.50"),
            row("2024-03-05", "Salary", "2500.00"),
        ]);

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        assert_eq!(result.inserted_count, 2);
        assert_eq!(result.inserted.len(), 2);
        assert_eq!(result.status(), BatchStatus::Success);
        assert_eq!(db.count_transactions().unwrap(), 2);
    }

    #[test]
    fn test_invalid_rows_fail_and_batch_continues() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("not a date", "Coffee", "-3.50"),
            row("2024-03-01", "Coffee", "lots"),
            row("2024-03-01", "Coffee", "-3.50"),
        ]);

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.status(), BatchStatus::Warning);
        assert!(result.rows[0].fingerprint.is_none());
        assert!(result.rows[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("Unable to parse date"));
        assert_eq!(result.rows[2].outcome, RowOutcome::Inserted);
    }

    #[test]
    fn test_out_of_range_amount_fails_and_batch_continues() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Wire", "1000000000000000000000000000"),
            row("2024-03-01", "Coffee", "-3.50"),
        ]);

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        assert_eq!(result.rows[0].outcome, RowOutcome::Failed);
        assert!(result.rows[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("out of range"));
        assert_eq!(result.rows[1].outcome, RowOutcome::Inserted);
        assert_eq!(db.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_unreachable_store_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let db =
            Database::with_lock_timeout(&path.to_string_lossy(), Duration::from_millis(250))
                .unwrap();
        let config = ReconcileConfig::default();

        // Every pooled connection checked out: the pre-flight ping times out
        let held: Vec<_> = (0..10).map(|_| db.conn().unwrap()).collect();
        let err = Reconciler::new(&db, &config)
            .reconcile(&Batch::new(vec![row("2024-03-01", "Coffee", "-3.50")]))
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_retryable());
        drop(held);

        // Nothing was recorded
        assert_eq!(db.count_transactions().unwrap(), 0);
        assert!(db.list_batches(10).unwrap().is_empty());
    }

    #[test]
    fn test_repeat_within_batch_is_exact_duplicate() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Coffee", "-3.50"),
            row("01/03/2024", "  COFFEE ", "-3,5"),
        ]);

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.exact_duplicate_count, 1);
    }

    #[test]
    fn test_near_duplicate_within_batch_is_pending() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Coffee Shop", "-3.50"),
            row("2024-03-02", "Coffee Shop Madrid", "-3.50"),
        ]);

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.status(), BatchStatus::ConfirmationRequired);

        let pending = &result.pending_matches[0];
        assert_eq!(pending.existing_match.fingerprint, result.inserted[0].fingerprint);
        assert!(pending.similarity >= config.similarity_threshold);
        // Pending candidates are not admitted
        assert!(!db.exists(&pending.candidate.fingerprint).unwrap());
    }

    #[test]
    fn test_external_id_policy() {
        let db = Database::in_memory().unwrap();
        db.insert(
            &fingerprint::normalize(&row("2024-03-01", "Coffee Shop", "-3.50"))
                .unwrap()
                .into_record(Utc::now()),
        )
        .unwrap();

        let batch = Batch::new(vec![
            row("2024-03-02", "Coffee Shop", "-3.50").with_external_id("BANK-1")
        ]);

        let fuzzy = ReconcileConfig::default();
        let result = Reconciler::new(&db, &fuzzy).reconcile(&batch).unwrap();
        assert_eq!(result.pending_count, 1);

        let exact_only = ReconcileConfig {
            external_id_matching: ExternalIdMatching::ExactOnly,
            ..Default::default()
        };
        let result = Reconciler::new(&db, &exact_only).reconcile(&batch).unwrap();
        assert_eq!(result.inserted_count, 1);
        assert!(db.exists("BANK-1").unwrap());
    }

    #[test]
    fn test_sink_called_once_with_inserted() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let sink = RecordingSink::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Coffee", "-3.50"),
            row("2024-03-05", "Salary", "2500.00"),
        ])
        .with_source("march.csv");

        Reconciler::new(&db, &config)
            .with_sink(&sink)
            .reconcile(&batch)
            .unwrap();
        // Replaying inserts nothing, so no second notification
        Reconciler::new(&db, &config)
            .with_sink(&sink)
            .reconcile(&batch)
            .unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (Some("march.csv".to_string()), 2));
    }

    #[test]
    fn test_sink_failure_does_not_change_result() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![row("2024-03-01", "Coffee", "-3.50")]);

        let result = Reconciler::new(&db, &config)
            .with_sink(&FailingSink)
            .reconcile(&batch)
            .unwrap();
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.status(), BatchStatus::Success);
    }

    #[test]
    fn test_batch_history_is_recorded() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let batch = Batch::new(vec![
            row("2024-03-01", "Coffee", "-3.50"),
            row("bad", "Coffee", "-3.50"),
        ])
        .with_source("upload.xlsx");

        let result = Reconciler::new(&db, &config).reconcile(&batch).unwrap();
        let id = result.batch_id.unwrap();

        let record = db.get_batch(id).unwrap().unwrap();
        assert_eq!(record.source.as_deref(), Some("upload.xlsx"));
        assert_eq!(record.row_count, 2);
        assert_eq!(record.inserted_count, 1);
        assert_eq!(record.failed_count, 1);
        assert_eq!(record.status, BatchStatus::Warning);
    }

    #[test]
    fn test_empty_batch() {
        let db = Database::in_memory().unwrap();
        let config = ReconcileConfig::default();
        let result = Reconciler::new(&db, &config)
            .reconcile(&Batch::default())
            .unwrap();
        assert_eq!(result.total(), 0);
        assert_eq!(result.status(), BatchStatus::Success);
    }
}
