//! Pending match and confirmation handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::{AppError, AppState};
use tally_core::models::{Confirmation, PendingMatch, Resolution, ResolveOutcome};
use tally_core::Resolver;

#[derive(Serialize)]
pub struct PendingView {
    #[serde(flatten)]
    pub pending: PendingMatch,
    /// When the match stops being answerable
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub pending: Vec<PendingView>,
}

/// GET /api/pending - Near-duplicates awaiting a decision
pub async fn list_pending(State(state): State<Arc<AppState>>) -> Json<PendingResponse> {
    let ttl = TimeDelta::from_std(state.pending.ttl()).ok();

    let pending: Vec<PendingView> = state
        .pending
        .list()
        .into_iter()
        .map(|p| PendingView {
            expires_at: ttl.and_then(|ttl| p.detected_at.checked_add_signed(ttl)),
            pending: p,
        })
        .collect();

    Json(PendingResponse {
        count: pending.len(),
        pending,
    })
}

/// POST /api/confirmations - Resolve one pending candidate
///
/// Rejected confirmations (unknown or expired candidate, missing fields)
/// return 422 with the reason.
pub async fn submit_confirmation(
    State(state): State<Arc<AppState>>,
    Json(confirmation): Json<Confirmation>,
) -> Result<(StatusCode, Json<Resolution>), AppError> {
    let worker = Arc::clone(&state);
    let resolution = tokio::task::spawn_blocking(move || {
        Resolver::new(&worker.db, &worker.pending).resolve(&confirmation)
    })
    .await??;

    let status = match resolution.outcome {
        ResolveOutcome::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    Ok((status, Json(resolution)))
}
