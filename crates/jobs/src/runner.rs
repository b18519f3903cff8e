// crates/jobs/src/runner.rs
//! Row-by-row delivery loop for one job.
//!
//! ```text
//! pending ──prepare ok──▶ running ──all rows──▶ completed
//!    │                       └──stop flag──────▶ stopped
//!    └──prepare err─────────────────────────────▶ failed
//! ```
//!
//! All waits (inter-message delay, backoff, rate-limit) are plain sleeps in
//! this one task; the stop flag is re-checked after each of them.

use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::Topic;
use crate::config::RunnerConfig;
use crate::event::JobEvent;
use crate::state::JobState;
use crate::template::CaptionTemplate;
use crate::transport::{DeliveryOutcome, Transport};
use crate::types::{JobStatus, Row, RowState, DESTINATION_FIELD, IMAGE_FIELD};

pub const MISSING_IMAGE: &str = "missing image reference";
pub const MISSING_DESTINATION: &str = "missing destination";

/// Final status plus the per-row delivery state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: JobStatus,
    pub rows: Vec<RowState>,
}

enum Resolution {
    Sent,
    Failed(String),
    /// Stop requested while waiting inside the row; counters untouched.
    Abandoned,
}

/// Drives one job from `pending` to a terminal status.
pub struct Runner {
    topic: Arc<Topic>,
    rows: Vec<Row>,
    transport: Arc<dyn Transport>,
    config: Arc<RunnerConfig>,
    template: CaptionTemplate,
}

impl Runner {
    pub fn new(
        topic: Arc<Topic>,
        rows: Vec<Row>,
        transport: Arc<dyn Transport>,
        config: Arc<RunnerConfig>,
    ) -> Self {
        let template = CaptionTemplate::new(&config.caption_template, config.max_caption_chars);
        Self {
            topic,
            rows,
            transport,
            config,
            template,
        }
    }

    fn state(&self) -> &JobState {
        self.topic.state()
    }

    pub async fn run(self) -> RunReport {
        let job_id = self.state().id();
        let mut rows = vec![RowState::Pending; self.rows.len()];

        let prepared = self.prepare().await;
        if self.state().is_stop_requested() {
            return self.finish_stopped(rows);
        }
        if let Err(error) = prepared {
            tracing::warn!(job_id = %job_id, error = %error, "Job setup failed");
            self.topic.emit(|s| JobEvent::Log(s.append_log(format!("Setup failed: {error}"))));
            self.topic.emit_if(|s| {
                if s.fail(error) {
                    s.terminal_event()
                } else {
                    None
                }
            });
            return self.report(rows);
        }

        let total = self.rows.len();
        self.topic.emit(|s| {
            s.start();
            JobEvent::Log(s.append_log(format!("Started sending {total} messages")))
        });
        self.topic.emit(|s| JobEvent::Progress(s.progress()));
        tracing::info!(job_id = %job_id, total, "Job started");

        for (index, row) in self.rows.iter().enumerate() {
            if self.state().is_stop_requested() {
                return self.finish_stopped(rows);
            }

            match self.deliver(index, row).await {
                Resolution::Sent => {
                    rows[index] = RowState::Sent;
                    self.topic
                        .emit(|s| JobEvent::Log(s.append_log(format!("Row {}: sent", index + 1))));
                    self.topic.emit(|s| {
                        s.record_sent();
                        JobEvent::Progress(s.progress())
                    });
                }
                Resolution::Failed(error) => {
                    rows[index] = RowState::Failed;
                    tracing::warn!(job_id = %job_id, row = index, error = %error, "Row failed");
                    self.topic.emit(|s| {
                        JobEvent::Log(s.append_log(format!("Row {}: failed: {error}", index + 1)))
                    });
                    self.topic.emit(|s| {
                        s.record_failed(index, error);
                        JobEvent::Progress(s.progress())
                    });
                }
                Resolution::Abandoned => return self.finish_stopped(rows),
            }

            if index + 1 < total {
                tokio::time::sleep(self.config.inter_message_delay).await;
            }
        }

        self.topic.emit_if(|s| {
            if s.finish(JobStatus::Completed) {
                s.terminal_event()
            } else {
                None
            }
        });
        let counters = self.state().counters();
        tracing::info!(
            job_id = %job_id,
            sent = counters.sent,
            failed = counters.failed,
            duration_secs = self.state().elapsed().as_secs_f64(),
            "Job completed"
        );
        self.report(rows)
    }

    /// Resolve one row: render, then attempt delivery with retry/backoff.
    async fn deliver(&self, index: usize, row: &Row) -> Resolution {
        let mapping = self.state().mapping();
        let Some(media) = mapping.value(row, IMAGE_FIELD) else {
            return Resolution::Failed(MISSING_IMAGE.to_string());
        };
        let Some(destination) = mapping.value(row, DESTINATION_FIELD) else {
            return Resolution::Failed(MISSING_DESTINATION.to_string());
        };
        let caption = self.template.render(mapping, row);

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(destination, media, &caption).await {
                DeliveryOutcome::Sent => return Resolution::Sent,
                DeliveryOutcome::RateLimited { retry_after } => {
                    let retry_after = retry_after.min(self.config.max_rate_limit_wait);
                    let retry_after_seconds = ceil_secs(retry_after);
                    tracing::info!(
                        job_id = %self.state().id(),
                        row = index,
                        retry_after_secs = retry_after_seconds,
                        "Rate limited"
                    );
                    self.topic.publish(JobEvent::RateLimit {
                        retry_after_seconds,
                    });
                    self.topic.emit(|s| {
                        JobEvent::Log(s.append_log(format!(
                            "Row {}: rate limited, waiting {retry_after_seconds}s",
                            index + 1
                        )))
                    });
                    tokio::time::sleep(self.config.rate_limit_wait(retry_after)).await;
                }
                DeliveryOutcome::Failed(error) => {
                    if attempt >= max_attempts {
                        return Resolution::Failed(error);
                    }
                    let wait = self.config.backoff(attempt);
                    tracing::debug!(
                        job_id = %self.state().id(),
                        row = index,
                        attempt,
                        error = %error,
                        "Delivery attempt failed, backing off"
                    );
                    self.topic.emit(|s| {
                        JobEvent::Log(s.append_log(format!(
                            "Row {}: attempt {attempt}/{max_attempts} failed: {error}; retrying in {}s",
                            index + 1,
                            wait.as_secs_f64()
                        )))
                    });
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }

            if self.state().is_stop_requested() {
                return Resolution::Abandoned;
            }
        }
    }

    /// Transport setup, bounded by the request timeout.
    async fn prepare(&self) -> Result<(), String> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.transport.prepare()).await {
            Ok(result) => result,
            Err(_) => Err(format!("setup timed out after {}s", timeout.as_secs_f64())),
        }
    }

    /// One outbound call, bounded by the request timeout.
    async fn attempt(&self, destination: &str, media: &str, caption: &str) -> DeliveryOutcome {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.transport.send(destination, media, caption)).await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Failed(format!(
                "request timed out after {}s",
                timeout.as_secs_f64()
            )),
        }
    }

    fn finish_stopped(&self, rows: Vec<RowState>) -> RunReport {
        self.topic
            .emit(|s| JobEvent::Log(s.append_log("Stopped by request")));
        self.topic.emit_if(|s| {
            if s.finish(JobStatus::Stopped) {
                s.terminal_event()
            } else {
                None
            }
        });
        tracing::info!(job_id = %self.state().id(), current = self.state().counters().current, "Job stopped");
        self.report(rows)
    }

    fn report(&self, rows: Vec<RowState>) -> RunReport {
        RunReport {
            status: self.state().status(),
            rows,
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}
