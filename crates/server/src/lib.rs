// crates/server/src/lib.rs
//! HTTP surface for bulk delivery jobs.
//!
//! Exposes submission, status, stop and a live SSE event stream over
//! [`bulksend_jobs::JobRegistry`], plus the Bot-API transport used in
//! production.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telegram;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Cli, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;
pub use telegram::TelegramTransport;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
