//! Ledger store: SQLite behind a connection pool
//!
//! This module is organized by domain:
//! - `transactions` - The ledger: confirmed transactions keyed by fingerprint
//! - `discards` - Discard log of candidates judged to be duplicates
//! - `batches` - Batch history of reconcile runs

use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::{TallyConfig, DEFAULT_LOCK_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::fingerprint::amount_to_cents;

mod batches;
mod discards;
mod transactions;

pub use transactions::InsertOutcome;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a timestamp the way it is stored
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored timestamp into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Stored as "YYYY-MM-DD HH:MM:SS.ffffff"; the fraction is optional
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Amounts are stored as integer cents
pub(crate) fn to_cents(amount: Decimal) -> Result<i64> {
    amount_to_cents(amount)
        .ok_or_else(|| Error::InvalidRecord(format!("Amount out of range: {}", amount)))
}

pub(crate) fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    lock_timeout: Duration,
}

impl Database {
    /// Open (or create) a ledger with the default lock timeout
    pub fn new(path: &str) -> Result<Self> {
        Self::with_lock_timeout(path, Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    /// Open (or create) a ledger using the store settings of a loaded config
    pub fn open(path: &str, config: &TallyConfig) -> Result<Self> {
        Self::with_lock_timeout(path, config.lock_timeout)
    }

    /// Open (or create) a ledger with an explicit bound on lock waits
    ///
    /// Every pooled connection waits at most `lock_timeout` for the SQLite
    /// write lock, and checking a connection out of the pool waits at most
    /// the same, so no store operation hangs indefinitely.
    pub fn with_lock_timeout(path: &str, lock_timeout: Duration) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(lock_timeout)?;
            conn.execute_batch(
                r#"
                -- Synchronous NORMAL: safe with WAL, avoids an fsync per commit
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                "#,
            )?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(10)
            .connection_timeout(lock_timeout)
            .build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            lock_timeout,
        };
        db.run_migrations()?;

        debug!("Opened ledger at {}", path);
        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a unique temporary file rather than `:memory:` so that every
    /// pooled connection sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove leftovers from an earlier run with the same pid
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path, suffix));
        }

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Verify the store answers a trivial query
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| {
                warn!("Ledger ping failed: {}", e);
                Error::StorageUnavailable(e.to_string())
            })?;
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Ledger of confirmed transactions
            CREATE TABLE IF NOT EXISTS transactions (
                fingerprint TEXT PRIMARY KEY NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                category TEXT,
                external_id TEXT,
                processed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_amount_date
                ON transactions(amount_cents, date);

            -- Candidates judged to be duplicates of an existing record
            CREATE TABLE IF NOT EXISTS discards (
                candidate_fingerprint TEXT PRIMARY KEY NOT NULL,
                existing_fingerprint TEXT NOT NULL,
                decided_at TEXT NOT NULL
            );

            -- One row per reconcile run
            CREATE TABLE IF NOT EXISTS batches (
                id INTEGER PRIMARY KEY,
                source TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                row_count INTEGER NOT NULL DEFAULT 0,
                inserted_count INTEGER NOT NULL DEFAULT 0,
                pending_count INTEGER NOT NULL DEFAULT 0,
                exact_duplicate_count INTEGER NOT NULL DEFAULT 0,
                previously_discarded_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_batches_started ON batches(started_at);
            "#,
        )?;

        Ok(())
    }
}
