//! Tally Web Server
//!
//! Axum-based REST API for the Tally reconciliation ledger. The server is
//! the session layer: it owns the pending store that holds near-duplicates
//! between a batch upload and the human decision.
//!
//! - Sanitized error responses (internal errors are logged, not returned)
//! - 503 when the ledger cannot be reached
//! - Background sweeper for expired pending matches

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use tally_core::{
    Database, LogSink, NotificationSink, PendingStore, ReconcileConfig, DEFAULT_PENDING_TTL,
};

mod handlers;
mod sweeper;

pub use sweeper::start_pending_sweeper;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Default interval between pending store sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a pending match stays answerable
    pub pending_ttl: Duration,
    /// How often expired pending matches are dropped
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pending_ttl: DEFAULT_PENDING_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables
    ///
    /// - `TALLY_PENDING_TTL_SECS`: pending match lifetime (default: 86400)
    /// - `TALLY_PENDING_SWEEP_SECS`: sweep interval (default: 300)
    ///
    /// Invalid or zero values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_secs("TALLY_PENDING_TTL_SECS") {
            config.pending_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("TALLY_PENDING_SWEEP_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }

        config
    }
}

fn env_secs(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!("Ignoring invalid {}={}, using default", key, value);
            None
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub reconcile: ReconcileConfig,
    /// Near-duplicates awaiting a decision, keyed by candidate fingerprint
    pub pending: PendingStore,
    /// Receives records inserted by each batch
    pub sink: Arc<dyn NotificationSink>,
}

impl AppState {
    pub fn new(db: Database, reconcile: ReconcileConfig, config: &ServerConfig) -> Self {
        Self {
            db,
            reconcile,
            pending: PendingStore::new(config.pending_ttl),
            sink: Arc::new(LogSink),
        }
    }
}

/// Create the application router
pub fn create_router(db: Database, reconcile: ReconcileConfig, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState::new(db, reconcile, config));
    create_router_with_state(state)
}

/// Create the application router around existing state (for testing and the sweeper)
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Batches
        .route(
            "/batches",
            get(handlers::list_batches).post(handlers::submit_batch),
        )
        .route("/batches/:id", get(handlers::get_batch))
        // Confirmations
        .route("/pending", get(handlers::list_pending))
        .route("/confirmations", post(handlers::submit_confirmation))
        // Ledger
        .route("/transactions/recent", get(handlers::recent_transactions))
        .route("/discards", get(handlers::list_discards));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn serve(
    db: Database,
    reconcile: ReconcileConfig,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    serve_with_config(db, reconcile, host, port, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    reconcile: ReconcileConfig,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    match db.ping() {
        Ok(()) => info!("Ledger reachable at {}", db.path()),
        Err(e) => warn!("Ledger not reachable at startup: {}", e),
    }

    let state = Arc::new(AppState::new(db, reconcile, &config));
    start_pending_sweeper(Arc::clone(&state), config.sweep_interval);

    let app = create_router_with_state(state);
    let addr = format!("{}:{}", host, port);

    info!(
        "Starting server at http://{} (pending matches expire after {}s)",
        addr,
        config.pending_ttl.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Lock timeouts and an unreachable ledger are worth retrying
        let retryable = err
            .downcast_ref::<tally_core::Error>()
            .is_some_and(|e| e.is_retryable());

        if retryable {
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "Storage is temporarily unavailable, try again later".to_string(),
                internal: Some(err),
            };
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
