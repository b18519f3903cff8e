// crates/jobs/src/types.rs
//! Types for the bulk delivery job system.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Status of a delivery job.
///
/// `Completed`, `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum JobStatus {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Stopped = 3,
    Failed = 4,
}

impl JobStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input record: column name to cell value.
pub type Row = HashMap<String, String>;

/// Target field holding the recipient (chat id / phone number).
pub const DESTINATION_FIELD: &str = "destination";
/// Target field holding the media reference (URL or remote file id).
pub const IMAGE_FIELD: &str = "image";
/// Target fields every mapping must name.
pub const REQUIRED_FIELDS: [&str; 2] = [DESTINATION_FIELD, IMAGE_FIELD];

/// Target-field to source-column association used to project a row into a
/// message. Immutable once a job is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(HashMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of `target <- source`.
    pub fn with(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.0.insert(target.into(), source.into());
        self
    }

    /// Source column for a target field, if mapped to a non-blank column name.
    pub fn source(&self, target: &str) -> Option<&str> {
        self.0
            .get(target)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Required target fields that are not mapped.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .into_iter()
            .filter(|f| self.source(f).is_none())
            .collect()
    }

    /// Trimmed value of `target` in `row`; `None` when unmapped, absent or blank.
    pub fn value<'a>(&self, row: &'a Row, target: &str) -> Option<&'a str> {
        let source = self.source(target)?;
        row.get(source)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Delivery state of one row within a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    Pending,
    Sent,
    Failed,
}

/// A row that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// Zero-based position in the submitted rows.
    pub row_index: usize,
    pub error_message: String,
}

/// One timestamped line of the job log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}
