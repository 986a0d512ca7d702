//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_config` - Print the effective configuration

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::config::default_config_path;
use tally_core::{Database, TallyConfig};

/// Open the ledger with the configured lock timeout
pub fn open_db(db_path: &Path, config: &TallyConfig) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::open(path_str, config).context("Failed to open database")
}

pub fn cmd_init(db_path: &Path, config: &TallyConfig) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, config)?;
    let existing = db
        .count_transactions()
        .context("Failed to read the ledger")?;
    if existing > 0 {
        println!("   Ledger already holds {} transaction(s)", existing);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Reconcile rows: tally reconcile --file statement.csv --interactive");
    println!("  2. Start web API: tally serve");

    Ok(())
}

pub fn cmd_config(config: &TallyConfig, explicit: Option<&Path>) -> Result<()> {
    match explicit {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => match default_config_path() {
            Some(path) if path.exists() => println!("# Loaded from {}", path.display()),
            Some(path) => println!("# No config file at {} (using defaults)", path.display()),
            None => println!("# No config directory available (using defaults)"),
        },
    }
    println!("# Environment overrides (TALLY_*) are already applied");
    println!();

    let rendered = config.to_toml().context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
