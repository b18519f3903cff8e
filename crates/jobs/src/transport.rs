// crates/jobs/src/transport.rs
//! The outbound delivery seam.

use std::time::Duration;

use async_trait::async_trait;

/// Result of one delivery attempt. The runner handles exactly these shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// The endpoint asked us to wait before trying again. Not an error.
    RateLimited { retry_after: Duration },
    Failed(String),
}

/// Remote messaging endpoint that delivers one image + caption.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Cheap, synchronous credential presence check run at submission.
    fn check_config(&self) -> Result<(), String> {
        Ok(())
    }

    /// Setup step run once per job before the first row.
    async fn prepare(&self) -> Result<(), String> {
        Ok(())
    }

    async fn send(&self, destination: &str, media: &str, caption: &str) -> DeliveryOutcome;
}
