//! Ledger read handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::LimitQuery;
use crate::{AppError, AppState};
use tally_core::models::{DiscardEntry, TransactionRecord};

const DEFAULT_RECENT_COUNT: usize = 5;
const MAX_RECENT_COUNT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// Kept as text: anything unusable falls back to the default
    pub count: Option<String>,
}

impl RecentQuery {
    fn resolve(&self) -> usize {
        match self.count.as_deref().map(|c| c.trim().parse::<i64>()) {
            Some(Ok(n)) if n > 0 && n <= MAX_RECENT_COUNT => n as usize,
            _ => DEFAULT_RECENT_COUNT,
        }
    }
}

/// GET /api/transactions/recent - Newest ledger records
pub async fn recent_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<TransactionRecord>>, AppError> {
    let records = state.db.list_recent(query.resolve())?;
    Ok(Json(records))
}

/// GET /api/discards - Discard decisions, newest first
pub async fn list_discards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<DiscardEntry>>, AppError> {
    let entries = state.db.list_discards(query.resolve(50))?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(count: Option<&str>) -> RecentQuery {
        RecentQuery {
            count: count.map(String::from),
        }
    }

    #[test]
    fn test_recent_count_fallback() {
        assert_eq!(query(None).resolve(), 5);
        assert_eq!(query(Some("12")).resolve(), 12);
        assert_eq!(query(Some("100")).resolve(), 100);
        assert_eq!(query(Some("101")).resolve(), 5);
        assert_eq!(query(Some("0")).resolve(), 5);
        assert_eq!(query(Some("-3")).resolve(), 5);
        assert_eq!(query(Some("ten")).resolve(), 5);
    }
}
