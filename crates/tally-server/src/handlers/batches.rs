//! Batch handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use super::LimitQuery;
use crate::{AppError, AppState};
use tally_core::models::{Batch, BatchRecord, BatchResult, BatchStatus};
use tally_core::Reconciler;

/// Largest batch accepted in one request
pub const MAX_BATCH_ROWS: usize = 50_000;

#[derive(Serialize)]
pub struct BatchResponse {
    pub status: BatchStatus,
    pub message: String,
    #[serde(flatten)]
    pub result: BatchResult,
}

/// POST /api/batches - Reconcile a batch of rows
///
/// Near-duplicates found in the batch are kept in the pending store until
/// confirmed or expired.
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<Batch>,
) -> Result<Json<BatchResponse>, AppError> {
    if batch.rows.len() > MAX_BATCH_ROWS {
        return Err(AppError::bad_request(&format!(
            "Batch too large: {} rows (max {})",
            batch.rows.len(),
            MAX_BATCH_ROWS
        )));
    }

    let worker = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || -> tally_core::Result<BatchResult> {
        let result = Reconciler::new(&worker.db, &worker.reconcile)
            .with_sink(worker.sink.as_ref())
            .reconcile(&batch)?;
        worker.pending.add_all(result.pending_matches.iter().cloned());
        Ok(result)
    })
    .await??;

    let status = result.status();
    info!(
        "Batch {} from {}: {}",
        result
            .batch_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        result.source.as_deref().unwrap_or("unnamed upload"),
        status
    );

    Ok(Json(BatchResponse {
        status,
        message: result.message(),
        result,
    }))
}

/// GET /api/batches - Batch history, newest first
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<BatchRecord>>, AppError> {
    let batches = state.db.list_batches(query.resolve(20))?;
    Ok(Json(batches))
}

/// GET /api/batches/:id - A single batch history entry
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BatchRecord>, AppError> {
    let batch = state
        .db
        .get_batch(id)?
        .ok_or_else(|| AppError::not_found("Batch not found"))?;
    Ok(Json(batch))
}
