//! API route handlers for the bulksend server.

pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/jobs - Submit a delivery job
/// - GET  /api/jobs - List retained jobs
/// - GET  /api/jobs/{id} - Job status snapshot
/// - POST /api/jobs/{id}/stop - Request a stop
/// - GET  /api/jobs/{id}/events - SSE stream of job events
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .with_state(state)
}
