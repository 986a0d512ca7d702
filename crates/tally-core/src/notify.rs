//! Notification of newly admitted transactions

use tracing::info;

use crate::error::Result;
use crate::models::TransactionRecord;

/// Receives the records a batch inserted, once per batch, after persistence
///
/// Failures are logged by the caller and never change the batch result.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, source: Option<&str>, inserted: &[TransactionRecord]) -> Result<()>;
}

/// Sink that writes the new records to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, source: Option<&str>, inserted: &[TransactionRecord]) -> Result<()> {
        info!(
            "{} new transaction(s) from {}",
            inserted.len(),
            source.unwrap_or("batch")
        );
        for record in inserted {
            info!(
                fingerprint = %record.fingerprint,
                "{}  {:>10}  {}",
                record.date,
                record.amount,
                record.description
            );
        }
        Ok(())
    }
}
