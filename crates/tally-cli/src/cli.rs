//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Reconcile bank rows into a duplicate-free ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Transaction reconciliation ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Configuration file (defaults to <data dir>/tally/config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Reconcile a batch of rows against the ledger
    Reconcile {
        /// Row file: CSV with date,description,amount columns, or JSON rows
        #[arg(short, long)]
        file: PathBuf,

        /// Batch source name (defaults to the file name)
        #[arg(short, long)]
        source: Option<String>,

        /// Ask about each possible duplicate before exiting
        #[arg(short, long)]
        interactive: bool,
    },

    /// Show the most recent ledger records
    Recent {
        /// Number of records to show
        #[arg(short, long, default_value = "5")]
        count: usize,
    },

    /// Show batch history
    Batches {
        /// Maximum batches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show discard decisions
    Discards {
        /// Maximum entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective configuration
    Config,
}
