//! Ledger operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{format_datetime, from_cents, parse_datetime, to_cents, Database};
use crate::error::{Error, Result};
use crate::models::TransactionRecord;

const RECORD_COLUMNS: &str =
    "fingerprint, date, description, amount_cents, category, external_id, processed_at";

/// Result of inserting a record into the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record is now in the ledger
    Inserted,
    /// A record with the same fingerprint was already present; nothing was written
    AlreadyExists,
}

impl Database {
    /// Whether the ledger holds a record with this fingerprint
    pub fn exists(&self, fingerprint: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM transactions WHERE fingerprint = ?",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a record unless its fingerprint is already present
    ///
    /// A single conditional insert: of any number of concurrent callers with
    /// the same fingerprint, exactly one sees `Inserted`.
    pub fn insert(&self, record: &TransactionRecord) -> Result<InsertOutcome> {
        let amount_cents = to_cents(record.amount)?;
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            INSERT INTO transactions (fingerprint, date, description, amount_cents, category, external_id, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
            params![
                record.fingerprint,
                record.date.to_string(),
                record.description,
                amount_cents,
                record.category,
                record.external_id,
                format_datetime(&record.processed_at),
            ],
        )?;

        Ok(if changed == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    /// Records with an amount in `[amount_low, amount_high]` and a date in
    /// `[date_low, date_high]`, closest to `target_date` first
    pub fn range_query(
        &self,
        amount_low: Decimal,
        amount_high: Decimal,
        date_low: NaiveDate,
        date_high: NaiveDate,
        target_date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let low_cents = bound_cents(amount_low, Decimal::floor)?;
        let high_cents = bound_cents(amount_high, Decimal::ceil)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM transactions
            WHERE amount_cents BETWEEN ? AND ?
              AND date BETWEEN ? AND ?
            ORDER BY ABS(julianday(date) - julianday(?)) ASC, date DESC, rowid ASC
            LIMIT ?
            "#
        ))?;

        let records = stmt
            .query_map(
                params![
                    low_cents,
                    high_cents,
                    date_low.to_string(),
                    date_high.to_string(),
                    target_date.to_string(),
                    limit as i64,
                ],
                |row| Self::row_to_record(row),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Newest records first (by transaction date, then admission time)
    pub fn list_recent(&self, count: usize) -> Result<Vec<TransactionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM transactions
            ORDER BY date DESC, processed_at DESC, rowid DESC
            LIMIT ?
            "#
        ))?;

        let records = stmt
            .query_map(params![count as i64], |row| Self::row_to_record(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get a single record by fingerprint
    pub fn get_transaction(&self, fingerprint: &str) -> Result<Option<TransactionRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM transactions WHERE fingerprint = ?"),
                params![fingerprint],
                |row| Self::row_to_record(row),
            )
            .optional()?;
        Ok(record)
    }

    /// Count records in the ledger
    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub(crate) fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        let date_str: String = row.get(1)?;
        let amount_cents: i64 = row.get(3)?;
        let processed_at_str: String = row.get(6)?;
        Ok(TransactionRecord {
            fingerprint: row.get(0)?,
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
            description: row.get(2)?,
            amount: from_cents(amount_cents),
            category: row.get(4)?,
            external_id: row.get(5)?,
            processed_at: parse_datetime(&processed_at_str),
        })
    }
}

fn bound_cents(bound: Decimal, round: fn(&Decimal) -> Decimal) -> Result<i64> {
    bound
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| round(&v))
        .and_then(|v| v.to_i64())
        .ok_or_else(|| Error::InvalidRecord(format!("Amount bound out of range: {}", bound)))
}
