// crates/jobs/src/error.rs
use thiserror::Error;

use crate::types::JobId;

/// Errors surfaced synchronously by the job registry.
///
/// Per-row delivery failures are not errors at this level: they are recorded
/// on the job as [`RowError`](crate::types::RowError) and the run continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),
}
