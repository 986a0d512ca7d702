//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod batches;
pub mod confirmations;
pub mod health;
pub mod ledger;

// Re-export all handlers for use in router
pub use batches::*;
pub use confirmations::*;
pub use health::*;
pub use ledger::*;

use serde::Deserialize;

use crate::MAX_PAGE_LIMIT;

/// `?limit=` for list endpoints
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    /// Requested limit clamped to `1..=MAX_PAGE_LIMIT`
    pub fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_LIMIT)
    }
}
