// crates/jobs/src/event.rs
//! Events pushed to job subscribers.

use serde::Serialize;

use crate::progress::Progress;
use crate::types::{JobStatus, LogEntry};

/// A single job event. Serialized with a `type` tag, e.g.
/// `{"type":"ratelimit","retryAfterSeconds":5}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    /// First event of every subscription, carrying the status at attach time.
    Connected { status: JobStatus },
    Progress(Progress),
    Log(LogEntry),
    #[serde(rename = "ratelimit", rename_all = "camelCase")]
    RateLimit { retry_after_seconds: u64 },
    /// Terminal: every row was processed. `duration` is in seconds.
    Done {
        sent: u64,
        failed: u64,
        total: u64,
        duration: u64,
    },
    /// Terminal: a stop request was honoured.
    Stopped {},
    /// Terminal: the job could not start (or its runner died).
    Error { message: String },
}

impl JobEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress(_) => "progress",
            Self::Log(_) => "log",
            Self::RateLimit { .. } => "ratelimit",
            Self::Done { .. } => "done",
            Self::Stopped {} => "stopped",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Stopped {} | Self::Error { .. })
    }
}
