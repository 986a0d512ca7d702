//! Tally CLI - Transaction reconciliation ledger
//!
//! Usage:
//!   tally init                          Create the ledger
//!   tally reconcile --file rows.csv     Reconcile a batch of rows
//!   tally recent --count 10             Show the newest records
//!   tally serve --port 3000             Start web server

mod cli;
mod commands;


use anyhow::{Context, Result};
use clap::Parser;
use tally_core::TallyConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config =
        TallyConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, &config),
        Commands::Reconcile {
            file,
            source,
            interactive,
        } => {
            let db = commands::open_db(&cli.db, &config)?;
            commands::cmd_reconcile(&db, &config.reconcile, &file, source.as_deref(), interactive)
                .map(|_| ())
        }
        Commands::Recent { count } => {
            let db = commands::open_db(&cli.db, &config)?;
            commands::cmd_recent(&db, count)
        }
        Commands::Batches { limit } => {
            let db = commands::open_db(&cli.db, &config)?;
            commands::cmd_batches(&db, limit)
        }
        Commands::Discards { limit } => {
            let db = commands::open_db(&cli.db, &config)?;
            commands::cmd_discards(&db, limit)
        }
        Commands::Serve { port, host } => commands::cmd_serve(&cli.db, &config, &host, port).await,
        Commands::Config => commands::cmd_config(&config, cli.config.as_deref()),
    }
}
