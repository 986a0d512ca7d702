//! Batch history operations

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{BatchRecord, BatchResult};

const BATCH_COLUMNS: &str = r#"
    id, source, status, row_count,
    inserted_count, pending_count, exact_duplicate_count,
    previously_discarded_count, failed_count,
    started_at, completed_at
"#;

impl Database {
    /// Open a batch history entry in the `running` state
    pub fn create_batch(&self, source: Option<&str>, row_count: usize) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO batches (source, status, row_count, started_at)
            VALUES (?, 'running', ?, ?)
            "#,
            params![source, row_count as i64, format_datetime(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Store the final counts and derived status of a batch
    pub fn complete_batch(&self, batch_id: i64, result: &BatchResult) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE batches SET
                status = ?,
                inserted_count = ?,
                pending_count = ?,
                exact_duplicate_count = ?,
                previously_discarded_count = ?,
                failed_count = ?,
                completed_at = ?
            WHERE id = ?
            "#,
            params![
                result.status().as_str(),
                result.inserted_count as i64,
                result.pending_count as i64,
                result.exact_duplicate_count as i64,
                result.previously_discarded_count as i64,
                result.failed_count as i64,
                format_datetime(&Utc::now()),
                batch_id,
            ],
        )?;
        Ok(())
    }

    /// Get a batch history entry by id
    pub fn get_batch(&self, batch_id: i64) -> Result<Option<BatchRecord>> {
        let conn = self.conn()?;
        let batch = conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"),
                params![batch_id],
                |row| Self::row_to_batch(row),
            )
            .optional()?;
        Ok(batch)
    }

    /// Batch history, newest first
    pub fn list_batches(&self, limit: usize) -> Result<Vec<BatchRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches ORDER BY started_at DESC, id DESC LIMIT ?"
        ))?;

        let batches = stmt
            .query_map(params![limit as i64], |row| Self::row_to_batch(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(batches)
    }

    fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<BatchRecord> {
        let status_str: String = row.get(2)?;
        let started_at: String = row.get(9)?;
        let completed_at: Option<String> = row.get(10)?;
        Ok(BatchRecord {
            id: row.get(0)?,
            source: row.get(1)?,
            status: status_str.parse().unwrap_or_default(),
            row_count: row.get(3)?,
            inserted_count: row.get(4)?,
            pending_count: row.get(5)?,
            exact_duplicate_count: row.get(6)?,
            previously_discarded_count: row.get(7)?,
            failed_count: row.get(8)?,
            started_at: parse_datetime(&started_at),
            completed_at: completed_at.as_deref().map(parse_datetime),
        })
    }
}
