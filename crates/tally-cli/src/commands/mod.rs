//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, config) and shared utilities (open_db)
//! - `reconcile` - Row file loading, batch reconciliation, interactive confirmation
//! - `ledger` - Read-only listings (recent records, batches, discards)
//! - `serve` - Web server command

pub mod core;
pub mod ledger;
pub mod reconcile;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use ledger::*;
pub use reconcile::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
