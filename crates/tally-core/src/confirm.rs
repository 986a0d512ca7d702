//! Confirmation resolver
//!
//! Applies a human decision to a pending near-duplicate:
//! - `insert` admits the candidate (idempotently, a concurrent insert wins)
//! - `discard` records the decision so the candidate is never asked about again
//!
//! Insert details must describe the pending candidate itself, and a discard
//! must name the record the candidate was matched against.
//!
//! Rejected confirmations come back as `ResolveOutcome::Invalid` with a
//! reason. Only storage failures while inserting are errors.

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{Database, InsertOutcome};
use crate::error::{Error, Result};
use crate::fingerprint::{normalize_description, round_amount};
use crate::models::{
    ConfirmAction, Confirmation, PendingMatch, Resolution, ResolveOutcome, TransactionRecord,
};
use crate::pending::PendingStore;

pub struct Resolver<'a> {
    db: &'a Database,
    pending: &'a PendingStore,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a Database, pending: &'a PendingStore) -> Self {
        Self { db, pending }
    }

    pub fn resolve(&self, confirmation: &Confirmation) -> Result<Resolution> {
        match self.apply(confirmation) {
            Ok(resolution) => {
                info!(
                    "Resolved {} ({}): {}",
                    confirmation.candidate_fingerprint, confirmation.action, resolution.outcome
                );
                Ok(resolution)
            }
            Err(Error::InvalidConfirmation(reason)) => {
                warn!(
                    "Rejected confirmation for {}: {}",
                    confirmation.candidate_fingerprint, reason
                );
                Ok(Resolution::invalid(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn apply(&self, confirmation: &Confirmation) -> Result<Resolution> {
        let fp = confirmation.candidate_fingerprint.as_str();
        let pending = self.pending.get(fp).ok_or_else(|| {
            Error::InvalidConfirmation(format!("Unknown or expired candidate: {}", fp))
        })?;

        match confirmation.action {
            ConfirmAction::Insert => self.apply_insert(confirmation, &pending),
            ConfirmAction::Discard => self.apply_discard(confirmation, &pending),
        }
    }

    fn apply_insert(
        &self,
        confirmation: &Confirmation,
        pending: &PendingMatch,
    ) -> Result<Resolution> {
        let fp = confirmation.candidate_fingerprint.as_str();

        // Admitted by another path since the match was detected
        if self.db.exists(fp)? {
            self.pending.take(fp);
            return Ok(Resolution::new(ResolveOutcome::AlreadyExists));
        }

        let details = confirmation.candidate.as_ref().ok_or_else(|| {
            Error::InvalidConfirmation("Insert requires the candidate details".to_string())
        })?;

        if details.description.trim().is_empty() {
            return Err(Error::InvalidConfirmation(
                "Candidate description is empty".to_string(),
            ));
        }

        // The record is keyed by the pending fingerprint, so its content must
        // be the content that fingerprint was computed from
        let candidate = &pending.candidate;
        if details.date != candidate.date
            || round_amount(details.amount) != round_amount(candidate.amount)
            || normalize_description(&details.description)
                != normalize_description(&candidate.description)
        {
            return Err(Error::InvalidConfirmation(format!(
                "Candidate details do not match pending candidate {}",
                fp
            )));
        }

        let record = TransactionRecord {
            fingerprint: fp.to_string(),
            date: candidate.date,
            description: candidate.description.clone(),
            amount: candidate.amount,
            category: details
                .category
                .clone()
                .or_else(|| candidate.category.clone()),
            external_id: candidate.external_id.clone(),
            processed_at: Utc::now(),
        };

        let outcome = match self.db.insert(&record)? {
            InsertOutcome::Inserted => ResolveOutcome::Inserted,
            InsertOutcome::AlreadyExists => ResolveOutcome::AlreadyExists,
        };
        self.pending.take(fp);
        Ok(Resolution::new(outcome))
    }

    fn apply_discard(
        &self,
        confirmation: &Confirmation,
        pending: &PendingMatch,
    ) -> Result<Resolution> {
        let fp = confirmation.candidate_fingerprint.as_str();
        let existing = confirmation
            .existing_fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                Error::InvalidConfirmation(
                    "Discard requires the existing record's fingerprint".to_string(),
                )
            })?;

        if existing != pending.existing_match.fingerprint {
            return Err(Error::InvalidConfirmation(format!(
                "Candidate {} was matched against {}, not {}",
                fp, pending.existing_match.fingerprint, existing
            )));
        }

        // The decision stands even if it could not be remembered
        match self.db.record_discard(fp, existing) {
            Ok(true) => {}
            Ok(false) => info!("Discard for {} was already recorded", fp),
            Err(e) => warn!("Failed to record discard for {}: {}", fp, e),
        }

        self.pending.take(fp);
        Ok(Resolution::new(ResolveOutcome::Discarded))
    }
}
