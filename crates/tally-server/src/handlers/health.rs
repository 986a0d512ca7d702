//! Health check handler

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_connection: bool,
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /health - Liveness plus ledger reachability
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let worker = Arc::clone(&state);
    let ping = tokio::task::spawn_blocking(move || worker.db.ping()).await;

    let failure = match ping {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(e.to_string()),
    };

    match failure {
        None => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                db_connection: true,
                pending: state.pending.len(),
                message: None,
            }),
        ),
        Some(message) => {
            warn!("Health check failed: {}", message);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error",
                    db_connection: false,
                    pending: state.pending.len(),
                    message: Some(message),
                }),
            )
        }
    }
}
