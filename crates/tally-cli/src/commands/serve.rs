//! Server command implementation

use std::path::Path;

use anyhow::Result;
use tally_core::TallyConfig;

use super::open_db;

pub async fn cmd_serve(db_path: &Path, config: &TallyConfig, host: &str, port: u16) -> Result<()> {
    let server_config = tally_server::ServerConfig::from_env();

    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Pending matches expire after {}s",
        server_config.pending_ttl.as_secs()
    );
    if host != "127.0.0.1" && host != "localhost" {
        println!();
        println!("   ⚠️  The API has no authentication - do not expose it to untrusted networks");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, config)?;

    tally_server::serve_with_config(db, config.reconcile.clone(), host, port, server_config)
        .await?;

    Ok(())
}
