//! Near-duplicate matching
//!
//! A near-duplicate is a ledger record with (almost) the same amount, a date
//! within a few days, and a similar description. Banks re-export the same
//! movement with a shifted value date or a reworded description, so these
//! are surfaced for a human decision instead of being inserted blindly.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ReconcileConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fingerprint::normalize_description;
use crate::models::TransactionRecord;

/// The best ledger record for a candidate and its description score
#[derive(Debug, Clone, PartialEq)]
pub struct NearMatch {
    pub record: TransactionRecord,
    pub similarity: f64,
}

/// Windowed fuzzy search over the ledger
pub struct Matcher<'a> {
    db: &'a Database,
    config: &'a ReconcileConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(db: &'a Database, config: &'a ReconcileConfig) -> Self {
        Self { db, config }
    }

    /// Find the most similar ledger record inside the amount/date window
    ///
    /// Candidates come back from the store closest date first, so on equal
    /// scores the nearest date wins.
    pub fn find_match(
        &self,
        amount: Decimal,
        date: NaiveDate,
        description: &str,
    ) -> Result<Option<NearMatch>> {
        let window = Days::new(u64::from(self.config.date_window_days));
        let date_low = date.checked_sub_days(window).unwrap_or(NaiveDate::MIN);
        let date_high = date.checked_add_days(window).unwrap_or(NaiveDate::MAX);
        let tolerance = self.config.amount_tolerance;
        let out_of_range =
            || Error::InvalidRecord(format!("Amount window out of range: {}", amount));
        let amount_low = amount.checked_sub(tolerance).ok_or_else(out_of_range)?;
        let amount_high = amount.checked_add(tolerance).ok_or_else(out_of_range)?;

        let candidates = self.db.range_query(
            amount_low,
            amount_high,
            date_low,
            date_high,
            date,
            self.config.candidate_limit,
        )?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let wanted = normalize_description(description);
        let mut best: Option<NearMatch> = None;

        for record in candidates {
            let score = similarity(&wanted, &normalize_description(&record.description));
            debug!(
                "Scored {} against '{}': {:.3}",
                record.fingerprint, record.description, score
            );

            if score < self.config.similarity_threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| score > b.similarity) {
                best = Some(NearMatch {
                    record,
                    similarity: score,
                });
            }
        }

        Ok(best)
    }
}

/// Similarity ratio `2 * LCS(a, b) / (|a| + |b|)` over characters
///
/// 1.0 for identical strings (including two empty ones), 0.0 when nothing is shared.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

/// Length of the longest common subsequence, two-row dynamic programming
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
