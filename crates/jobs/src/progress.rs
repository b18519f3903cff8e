// crates/jobs/src/progress.rs
//! Derived progress figures for a job.

use serde::Serialize;

/// Raw per-job counters. Always updated together so that
/// `sent + failed <= current` holds for every reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub current: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Progress payload shared by SSE `progress` events and status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub percent: u8,
}

impl Progress {
    pub fn new(counters: Counters, total: u64) -> Self {
        Self {
            current: counters.current,
            total,
            sent: counters.sent,
            failed: counters.failed,
            percent: percent(counters.current, total),
        }
    }
}

/// `round(current / total * 100)`, or 0 for an empty job.
pub fn percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
