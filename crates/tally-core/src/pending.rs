//! In-memory store of near-duplicates awaiting a decision
//!
//! Owned by the session layer (HTTP server, interactive CLI). Entries expire
//! after a TTL and are never persisted: after a restart an unresolved match
//! simply comes back the next time its batch is reconciled.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::PendingMatch;

/// Default time a pending match stays answerable
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct PendingEntry {
    pending: PendingMatch,
    created_at: Instant,
}

impl PendingEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Pending matches keyed by candidate fingerprint
pub struct PendingStore {
    entries: RwLock<HashMap<String, PendingEntry>>,
    ttl: Duration,
}

impl Default for PendingStore {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl PendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // A panic while holding the lock leaves the map itself consistent
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or refresh a pending match
    pub fn add(&self, pending: PendingMatch) {
        let key = pending.candidate.fingerprint.clone();
        self.write().insert(
            key,
            PendingEntry {
                pending,
                created_at: Instant::now(),
            },
        );
    }

    pub fn add_all(&self, pending: impl IntoIterator<Item = PendingMatch>) {
        for p in pending {
            self.add(p);
        }
    }

    /// Get a live pending match without removing it
    pub fn get(&self, candidate_fp: &str) -> Option<PendingMatch> {
        self.read()
            .get(candidate_fp)
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.pending.clone())
    }

    /// Remove and return a live pending match
    pub fn take(&self, candidate_fp: &str) -> Option<PendingMatch> {
        self.write()
            .remove(candidate_fp)
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.pending)
    }

    /// Live pending matches, oldest detection first
    pub fn list(&self) -> Vec<PendingMatch> {
        let mut pending: Vec<PendingMatch> = self
            .read()
            .values()
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.pending.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.candidate.fingerprint.cmp(&b.candidate.fingerprint))
        });
        pending
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .filter(|e| !e.is_expired(self.ttl))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(self.ttl));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired pending match(es)", evicted);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, TransactionRecord};
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn pending(fp: &str) -> PendingMatch {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        PendingMatch {
            candidate: Candidate {
                fingerprint: fp.to_string(),
                date,
                description: "Coffee Shop".to_string(),
                amount: Decimal::new(-350, 2),
                category: None,
                external_id: None,
            },
            existing_match: TransactionRecord {
                fingerprint: format!("existing-{}", fp),
                date,
                description: "Coffee Shp".to_string(),
                amount: Decimal::new(-350, 2),
                category: None,
                external_id: None,
                processed_at: Utc::now(),
            },
            similarity: 0.9,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_get_take() {
        let store = PendingStore::default();
        assert!(store.is_empty());

        store.add(pending("a"));
        store.add(pending("b"));
        assert_eq!(store.len(), 2);

        assert!(store.get("a").is_some());
        assert_eq!(store.len(), 2);

        let taken = store.take("a").unwrap();
        assert_eq!(taken.existing_match.fingerprint, "existing-a");
        assert!(store.get("a").is_none());
        assert!(store.take("a").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_replaces_same_candidate() {
        let store = PendingStore::default();
        store.add_all(vec![pending("a"), pending("a")]);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_expired_entries_are_invisible_and_evicted() {
        let store = PendingStore::new(Duration::from_millis(20));
        store.add(pending("a"));
        assert!(store.get("a").is_some());

        std::thread::sleep(Duration::from_millis(50));

        assert!(store.get("a").is_none());
        assert!(store.list().is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.evict_expired(), 0);
    }

    #[test]
    fn test_list_is_ordered_by_detection() {
        let store = PendingStore::default();
        let mut first = pending("z");
        first.detected_at = Utc::now() - chrono::Duration::minutes(5);
        store.add(pending("a"));
        store.add(first);

        let fps: Vec<String> = store
            .list()
            .into_iter()
            .map(|p| p.candidate.fingerprint)
            .collect();
        assert_eq!(fps, vec!["z", "a"]);
    }
}
