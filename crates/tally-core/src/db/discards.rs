//! Discard log operations

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::DiscardEntry;

impl Database {
    /// Remember that `candidate_fp` was judged a duplicate of `existing_fp`
    ///
    /// Idempotent: returns `false` when the candidate was already recorded,
    /// keeping the original decision.
    pub fn record_discard(&self, candidate_fp: &str, existing_fp: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO discards (candidate_fingerprint, existing_fingerprint, decided_at)
            VALUES (?, ?, ?)
            "#,
            params![candidate_fp, existing_fp, format_datetime(&Utc::now())],
        )?;
        Ok(changed > 0)
    }

    /// Whether a discard decision exists for this candidate
    pub fn was_discarded(&self, candidate_fp: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM discards WHERE candidate_fingerprint = ?",
                params![candidate_fp],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Discard decisions, newest first
    pub fn list_discards(&self, limit: usize) -> Result<Vec<DiscardEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT candidate_fingerprint, existing_fingerprint, decided_at
            FROM discards
            ORDER BY decided_at DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let decided_at: String = row.get(2)?;
                Ok(DiscardEntry {
                    candidate_fingerprint: row.get(0)?,
                    existing_fingerprint: row.get(1)?,
                    decided_at: parse_datetime(&decided_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
