// crates/jobs/src/registry.rs
//! Central registry that creates, tracks and retires delivery jobs.

use std::sync::Arc;

use dashmap::DashMap;

use crate::broadcast::{Broadcaster, Subscription};
use crate::config::RunnerConfig;
use crate::error::JobError;
use crate::event::JobEvent;
use crate::runner::Runner;
use crate::state::{JobSnapshot, JobState};
use crate::transport::Transport;
use crate::types::{FieldMapping, JobId, Row};

/// Central registry for delivery jobs.
///
/// `submit` spawns one runner task per job and returns immediately. Once a
/// job is terminal it stays queryable for `config.retention`, then it is
/// evicted together with its subscriber topic.
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, Arc<JobState>>>,
    broadcaster: Arc<Broadcaster>,
    transport: Arc<dyn Transport>,
    config: Arc<RunnerConfig>,
}

impl JobRegistry {
    pub fn new(transport: Arc<dyn Transport>, config: RunnerConfig) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            broadcaster: Arc::new(Broadcaster::new()),
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Validate and start a new job. Must be called within a tokio runtime.
    pub fn submit(&self, rows: Vec<Row>, mapping: FieldMapping) -> Result<JobId, JobError> {
        if rows.is_empty() {
            return Err(JobError::InvalidInput("rows must not be empty".into()));
        }
        let missing = mapping.missing_fields();
        if !missing.is_empty() {
            return Err(JobError::InvalidInput(format!(
                "mapping is missing required field(s): {}",
                missing.join(", ")
            )));
        }
        self.transport
            .check_config()
            .map_err(JobError::ConfigurationMissing)?;

        let id = JobId::new();
        let state = Arc::new(JobState::new(
            id,
            rows.len() as u64,
            mapping,
            self.config.max_log_entries,
        ));
        self.jobs.insert(id, Arc::clone(&state));
        let topic = self.broadcaster.register(state);
        tracing::info!(job_id = %id, rows = rows.len(), "Job submitted");

        let runner = Runner::new(
            Arc::clone(&topic),
            rows,
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
        );
        let jobs = Arc::clone(&self.jobs);
        let broadcaster = Arc::clone(&self.broadcaster);
        let retention = self.config.retention;

        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(runner.run()).await {
                tracing::error!(job_id = %id, error = %e, "Runner task aborted");
                topic.emit_if(|s| {
                    s.fail("runner task aborted")
                        .then(|| JobEvent::Error {
                            message: "runner task aborted".into(),
                        })
                });
            }
            drop(topic);

            tokio::time::sleep(retention).await;
            jobs.remove(&id);
            broadcaster.remove(&id);
            tracing::debug!(job_id = %id, "Job evicted");
        });

        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.jobs
            .get(&id)
            .map(|s| s.snapshot())
            .ok_or(JobError::NotFound(id))
    }

    /// Snapshots of every retained job, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<_> = self.jobs.iter().map(|s| s.snapshot()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Ask the job's runner to stop before its next row. Idempotent.
    pub fn request_stop(&self, id: JobId) -> Result<(), JobError> {
        let state = self
            .jobs
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(JobError::NotFound(id))?;
        if state.request_stop() {
            tracing::info!(job_id = %id, "Stop requested");
        }
        Ok(())
    }

    pub fn subscribe(&self, id: JobId) -> Result<Subscription, JobError> {
        self.broadcaster.subscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DeliveryOutcome;
    use crate::types::JobStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
            DeliveryOutcome::Sent
        }
    }

    struct Unconfigured;

    #[async_trait]
    impl Transport for Unconfigured {
        fn check_config(&self) -> Result<(), String> {
            Err("bot token is not set".into())
        }

        async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
            DeliveryOutcome::Sent
        }
    }

    struct HangingSetup;

    #[async_trait]
    impl Transport for HangingSetup {
        async fn prepare(&self) -> Result<(), String> {
            std::future::pending().await
        }

        async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
            DeliveryOutcome::Sent
        }
    }

    /// Delivers the first row, then panics inside the runner task.
    struct PanicOnSecondSend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for PanicOnSecondSend {
        async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                panic!("transport blew up");
            }
            DeliveryOutcome::Sent
        }
    }

    async fn terminal(registry: &JobRegistry, id: JobId) -> Vec<JobEvent> {
        let mut sub = registry.subscribe(id).unwrap();
        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn mapping() -> FieldMapping {
        FieldMapping::new()
            .with("destination", "chat")
            .with("image", "photo")
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                [("chat", format!("{}", 1000 + i)), ("photo", format!("https://cdn/{i}.jpg"))]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_rows() {
        let registry = JobRegistry::new(Arc::new(OkTransport), RunnerConfig::default());
        let err = registry.submit(Vec::new(), mapping()).unwrap_err();
        assert!(matches!(err, JobError::InvalidInput(_)));
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_incomplete_mapping() {
        let registry = JobRegistry::new(Arc::new(OkTransport), RunnerConfig::default());
        let err = registry
            .submit(rows(1), FieldMapping::new().with("destination", "chat"))
            .unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidInput("mapping is missing required field(s): image".into())
        );
    }

    #[tokio::test]
    async fn test_submit_requires_configuration() {
        let registry = JobRegistry::new(Arc::new(Unconfigured), RunnerConfig::default());
        let err = registry.submit(rows(1), mapping()).unwrap_err();
        assert_eq!(
            err,
            JobError::ConfigurationMissing("bot token is not set".into())
        );
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let registry = JobRegistry::new(Arc::new(OkTransport), RunnerConfig::default());
        let id = JobId::new();
        assert_eq!(registry.get(id).unwrap_err(), JobError::NotFound(id));
        assert_eq!(registry.request_stop(id).unwrap_err(), JobError::NotFound(id));
        assert!(registry.subscribe(id).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes_then_is_evicted() {
        let config = RunnerConfig {
            retention: Duration::from_secs(60),
            ..RunnerConfig::default()
        };
        let registry = JobRegistry::new(Arc::new(OkTransport), config);
        let id = registry.submit(rows(3), mapping()).unwrap();
        assert_eq!(registry.list().len(), 1);

        let mut sub = registry.subscribe(id).unwrap();
        while let Some(event) = sub.recv().await {
            if event.is_terminal() {
                break;
            }
        }
        let snap = registry.get(id).unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!((snap.sent, snap.failed, snap.current), (3, 0, 3));
        assert_eq!(snap.percent, 100);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.get(id).unwrap_err(), JobError::NotFound(id));
        assert!(registry.broadcaster().topic(&id).is_none());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_stop_is_idempotent() {
        let registry = JobRegistry::new(Arc::new(OkTransport), RunnerConfig::default());
        let id = registry.submit(rows(5), mapping()).unwrap();
        registry.request_stop(id).unwrap();
        registry.request_stop(id).unwrap();

        let mut sub = registry.subscribe(id).unwrap();
        let mut last = None;
        while let Some(event) = sub.recv().await {
            let terminal = event.is_terminal();
            last = Some(event);
            if terminal {
                break;
            }
        }
        assert_eq!(last, Some(JobEvent::Stopped {}));
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_job_stuck_in_setup() {
        let config = RunnerConfig {
            retention: Duration::from_secs(60),
            ..RunnerConfig::default()
        };
        let registry = JobRegistry::new(Arc::new(HangingSetup), config);
        let id = registry.submit(rows(3), mapping()).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Pending);

        registry.request_stop(id).unwrap();
        let events = terminal(&registry, id).await;
        assert_eq!(events.last(), Some(&JobEvent::Stopped {}));

        let snap = registry.get(id).unwrap();
        assert_eq!(snap.status, JobStatus::Stopped);
        assert_eq!((snap.sent, snap.failed, snap.current), (0, 0, 0));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.get(id).unwrap_err(), JobError::NotFound(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_panic_fails_job() {
        let transport = Arc::new(PanicOnSecondSend {
            calls: AtomicUsize::new(0),
        });
        let registry = JobRegistry::new(transport, RunnerConfig::default());
        let id = registry.submit(rows(3), mapping()).unwrap();

        let events = terminal(&registry, id).await;
        assert_eq!(
            events.last(),
            Some(&JobEvent::Error {
                message: "runner task aborted".into()
            })
        );

        let snap = registry.get(id).unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        // Only the row that finished before the panic is counted.
        assert_eq!((snap.sent, snap.failed, snap.current), (1, 0, 1));
    }
}
