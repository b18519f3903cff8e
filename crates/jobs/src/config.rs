// crates/jobs/src/config.rs
//! Tuning knobs for the delivery runner.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::template::DEFAULT_TEMPLATE;

/// Caption length limit of the Bot API `sendPhoto` call.
pub const DEFAULT_MAX_CAPTION_CHARS: usize = 1024;

/// Runner configuration. Durations are (de)serialized as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Delivery attempts per row, rate-limit waits excluded.
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub base_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    /// Added on top of the server-specified retry-after.
    #[serde(with = "duration_ms")]
    pub rate_limit_margin: Duration,
    /// Longest server-specified retry-after honoured in one wait.
    #[serde(with = "duration_ms")]
    pub max_rate_limit_wait: Duration,
    /// Pause between consecutive rows.
    #[serde(with = "duration_ms")]
    pub inter_message_delay: Duration,
    /// Upper bound for a single outbound call.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// How long a finished job stays queryable.
    #[serde(with = "duration_ms")]
    pub retention: Duration,
    pub max_log_entries: usize,
    pub caption_template: String,
    pub max_caption_chars: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            rate_limit_margin: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(600),
            inter_message_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            retention: Duration::from_secs(600),
            max_log_entries: 5000,
            caption_template: DEFAULT_TEMPLATE.to_string(),
            max_caption_chars: DEFAULT_MAX_CAPTION_CHARS,
        }
    }
}

impl RunnerConfig {
    /// Wait before retry number `attempt + 1`, given that `attempt` (1-based)
    /// just failed: `base * 2^(attempt-1)`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Sleep after a rate-limit answer: the (capped) retry-after plus margin.
    pub fn rate_limit_wait(&self, retry_after: Duration) -> Duration {
        retry_after
            .min(self.max_rate_limit_wait)
            .saturating_add(self.rate_limit_margin)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
