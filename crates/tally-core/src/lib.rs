//! Tally Core Library
//!
//! Transaction reconciliation for bank exports:
//! - Fingerprinting of normalized rows (or bank identifiers)
//! - SQLite ledger store with a discard log and batch history
//! - Near-duplicate matching inside an amount/date window
//! - Reconciliation pipeline classifying every row of a batch
//! - Confirmation resolver for pending near-duplicates
//! - TTL pending store and notification sink for session layers

pub mod config;
pub mod confirm;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod pending;
pub mod reconcile;

pub use config::{ExternalIdMatching, ReconcileConfig, TallyConfig};
pub use confirm::Resolver;
pub use db::{Database, InsertOutcome};
pub use error::{Error, Result};
pub use matcher::{Matcher, NearMatch};
pub use notify::{LogSink, NotificationSink};
pub use pending::{PendingStore, DEFAULT_PENDING_TTL};
pub use reconcile::Reconciler;
