// crates/jobs/src/state.rs
//! State of a single delivery job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::event::JobEvent;
use crate::progress::{Counters, Progress};
use crate::types::{FieldMapping, JobId, JobStatus, LogEntry, RowError};

/// State for a single job.
///
/// Only the job's own runner mutates it (the `pub(crate)` setters); status
/// queries and subscribers read concurrently. Status and the stop flag are
/// atomics; counters sit behind one short-lived lock so `current`, `sent` and
/// `failed` are always read as a consistent triple.
pub struct JobState {
    id: JobId,
    total: u64,
    mapping: FieldMapping,
    created_at: DateTime<Utc>,
    status: AtomicU8,
    stop_requested: AtomicBool,
    counters: RwLock<Counters>,
    log: RwLock<VecDeque<LogEntry>>,
    max_log_entries: usize,
    errors: RwLock<Vec<RowError>>,
    started_at: OnceLock<DateTime<Utc>>,
    finished_at: OnceLock<DateTime<Utc>>,
    started: OnceLock<Instant>,
    finished: OnceLock<Instant>,
    failure: OnceLock<String>,
}

/// Read-only copy of a job for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub total: u64,
    pub current: u64,
    pub sent: u64,
    pub failed: u64,
    pub percent: u8,
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(id: JobId, total: u64, mapping: FieldMapping, max_log_entries: usize) -> Self {
        Self {
            id,
            total,
            mapping,
            created_at: Utc::now(),
            status: AtomicU8::new(JobStatus::Pending as u8),
            stop_requested: AtomicBool::new(false),
            counters: RwLock::new(Counters::default()),
            log: RwLock::new(VecDeque::new()),
            max_log_entries: max_log_entries.max(1),
            errors: RwLock::new(Vec::new()),
            started_at: OnceLock::new(),
            finished_at: OnceLock::new(),
            started: OnceLock::new(),
            finished: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Set the stop flag. Returns `true` only for the call that set it.
    pub fn request_stop(&self) -> bool {
        !self.stop_requested.swap(true, Ordering::AcqRel)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn counters(&self) -> Counters {
        *self.read_counters()
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.counters(), self.total)
    }

    /// Retained log entries, oldest first.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        match self.log.read() {
            Ok(log) => log.iter().cloned().collect(),
            Err(e) => {
                tracing::error!(job_id = %self.id, "RwLock poisoned reading log: {e}");
                e.into_inner().iter().cloned().collect()
            }
        }
    }

    pub fn errors(&self) -> Vec<RowError> {
        match self.errors.read() {
            Ok(errors) => errors.clone(),
            Err(e) => {
                tracing::error!(job_id = %self.id, "RwLock poisoned reading errors: {e}");
                e.into_inner().clone()
            }
        }
    }

    /// Time spent running; zero before start, frozen once finished.
    pub fn elapsed(&self) -> Duration {
        match (self.started.get(), self.finished.get()) {
            (Some(start), Some(end)) => end.saturating_duration_since(*start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let progress = self.progress();
        JobSnapshot {
            id: self.id,
            status: self.status(),
            total: self.total,
            current: progress.current,
            sent: progress.sent,
            failed: progress.failed,
            percent: progress.percent,
            errors: self.errors(),
            created_at: self.created_at,
            started_at: self.started_at.get().copied(),
            finished_at: self.finished_at.get().copied(),
        }
    }

    /// The terminal event matching the current status, if terminal.
    pub fn terminal_event(&self) -> Option<JobEvent> {
        match self.status() {
            JobStatus::Completed => {
                let counters = self.counters();
                Some(JobEvent::Done {
                    sent: counters.sent,
                    failed: counters.failed,
                    total: self.total,
                    duration: self.elapsed().as_secs(),
                })
            }
            JobStatus::Stopped => Some(JobEvent::Stopped {}),
            JobStatus::Failed => Some(JobEvent::Error {
                message: self.failure.get().cloned().unwrap_or_default(),
            }),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }

    // -- Runner-side mutation ------------------------------------------------

    /// `pending -> running`. Returns `false` if the job already left `pending`.
    pub(crate) fn start(&self) -> bool {
        let moved = self
            .status
            .compare_exchange(
                JobStatus::Pending as u8,
                JobStatus::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            let _ = self.started_at.set(Utc::now());
            let _ = self.started.set(Instant::now());
        }
        moved
    }

    /// Move to a terminal status. Returns `false` (and changes nothing) if the
    /// job is already terminal.
    pub(crate) fn finish(&self, status: JobStatus) -> bool {
        debug_assert!(status.is_terminal());
        let moved = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (!JobStatus::from_u8(raw).is_terminal()).then_some(status as u8)
            })
            .is_ok();
        if moved {
            let _ = self.finished_at.set(Utc::now());
            let _ = self.finished.set(Instant::now());
        }
        moved
    }

    /// Terminal failure with a reason. Returns `false` if already terminal.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        let _ = self.failure.set(reason.into());
        self.finish(JobStatus::Failed)
    }

    pub(crate) fn append_log(&self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            time: Utc::now(),
            message: message.into(),
        };
        let mut log = match self.log.write() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(job_id = %self.id, "RwLock poisoned writing log: {e}");
                e.into_inner()
            }
        };
        if log.len() >= self.max_log_entries {
            log.pop_front();
        }
        log.push_back(entry.clone());
        entry
    }

    /// Count a delivered row.
    pub(crate) fn record_sent(&self) -> Counters {
        let mut counters = self.write_counters();
        counters.sent += 1;
        counters.current += 1;
        *counters
    }

    /// Count a row that failed for good, keeping its reason.
    pub(crate) fn record_failed(&self, row_index: usize, error: impl Into<String>) -> Counters {
        let mut counters = self.write_counters();
        match self.errors.write() {
            Ok(mut errors) => errors.push(RowError {
                row_index,
                error_message: error.into(),
            }),
            Err(e) => tracing::error!(job_id = %self.id, "RwLock poisoned writing errors: {e}"),
        }
        counters.failed += 1;
        counters.current += 1;
        *counters
    }

    fn read_counters(&self) -> RwLockReadGuard<'_, Counters> {
        self.counters.read().unwrap_or_else(|e| {
            tracing::error!(job_id = %self.id, "RwLock poisoned reading counters: {e}");
            e.into_inner()
        })
    }

    fn write_counters(&self) -> RwLockWriteGuard<'_, Counters> {
        self.counters.write().unwrap_or_else(|e| {
            tracing::error!(job_id = %self.id, "RwLock poisoned writing counters: {e}");
            e.into_inner()
        })
    }
}
