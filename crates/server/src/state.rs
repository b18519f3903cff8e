// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use bulksend_jobs::JobRegistry;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Delivery jobs: submission, status, stop and event subscriptions.
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(jobs: JobRegistry) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs: Arc::new(jobs),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
