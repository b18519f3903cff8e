// crates/jobs/src/lib.rs
//! Background bulk-delivery jobs.
//!
//! Provides:
//! - `JobRegistry` - creates jobs, spawns their runners, answers status queries
//! - `Runner` - the per-job delivery loop (retry, backoff, rate limits, stop)
//! - `Broadcaster` - per-job event fan-out with history replay for late subscribers
//! - `Progress` - derived counters shared by events and status queries
//! - `Transport` - the seam to the remote messaging endpoint

pub mod broadcast;
pub mod config;
pub mod error;
pub mod event;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod state;
pub mod template;
pub mod transport;
pub mod types;

pub use broadcast::{Broadcaster, SubscriberId, Subscription, Topic};
pub use config::RunnerConfig;
pub use error::JobError;
pub use event::JobEvent;
pub use progress::{percent, Counters, Progress};
pub use registry::JobRegistry;
pub use runner::{RunReport, Runner};
pub use state::{JobSnapshot, JobState};
pub use template::CaptionTemplate;
pub use transport::{DeliveryOutcome, Transport};
pub use types::{FieldMapping, JobId, JobStatus, LogEntry, Row, RowError, RowState};
