// crates/jobs/src/broadcast.rs
//! Per-job event fan-out.
//!
//! Every job gets a [`Topic`]: its state plus the list of attached
//! subscribers behind a per-job mutex. Event-visible mutations of the job are
//! applied *inside* that mutex (see [`Topic::emit`]), and attaching replays
//! history under the same mutex, so a subscriber always sees a gap-free,
//! duplicate-free sequence no matter when it attaches.
//!
//! Subscriber queues are unbounded: publishing never waits on a slow reader.
//! A subscriber whose receiver is gone is dropped on the next publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::JobError;
use crate::event::JobEvent;
use crate::state::JobState;
use crate::types::JobId;

pub type SubscriberId = u64;

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<JobEvent>,
}

/// Fan-out point for one job.
pub struct Topic {
    state: Arc<JobState>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Topic {
    pub fn new(state: Arc<JobState>) -> Self {
        Self {
            state,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &Arc<JobState> {
        &self.state
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Replay current history to `tx`, then register it for live events.
    ///
    /// Replay order: `connected`, retained log, progress, terminal event (if
    /// any). Returns `false` if the receiver is already closed.
    pub fn attach(&self, id: SubscriberId, tx: mpsc::UnboundedSender<JobEvent>) -> bool {
        let mut subscribers = self.lock();

        let mut replay = vec![JobEvent::Connected {
            status: self.state.status(),
        }];
        replay.extend(self.state.log_entries().into_iter().map(JobEvent::Log));
        replay.push(JobEvent::Progress(self.state.progress()));
        replay.extend(self.state.terminal_event());

        for event in replay {
            if tx.send(event).is_err() {
                return false;
            }
        }
        subscribers.push(Subscriber { id, tx });
        true
    }

    /// Idempotent.
    pub fn detach(&self, id: SubscriberId) {
        self.lock().retain(|s| s.id != id);
    }

    /// Push an event to every subscriber.
    pub fn publish(&self, event: JobEvent) {
        let mut subscribers = self.lock();
        fan_out(&mut subscribers, &event, self.state.id());
    }

    /// Apply a state change and publish the event it produces, atomically with
    /// respect to [`attach`](Self::attach).
    pub(crate) fn emit(&self, change: impl FnOnce(&JobState) -> JobEvent) -> JobEvent {
        let mut subscribers = self.lock();
        let event = change(&self.state);
        fan_out(&mut subscribers, &event, self.state.id());
        event
    }

    /// Like [`emit`](Self::emit), for changes that may turn out to be no-ops.
    pub(crate) fn emit_if(&self, change: impl FnOnce(&JobState) -> Option<JobEvent>) {
        let mut subscribers = self.lock();
        if let Some(event) = change(&self.state) {
            fan_out(&mut subscribers, &event, self.state.id());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| {
            tracing::error!(job_id = %self.state.id(), "Mutex poisoned on subscribers: {e}");
            e.into_inner()
        })
    }
}

fn fan_out(subscribers: &mut Vec<Subscriber>, event: &JobEvent, job_id: JobId) {
    subscribers.retain(|s| {
        let alive = s.tx.send(event.clone()).is_ok();
        if !alive {
            tracing::debug!(job_id = %job_id, subscriber = s.id, "Subscriber gone, detaching");
        }
        alive
    });
}

/// Registry of per-job topics.
pub struct Broadcaster {
    topics: DashMap<JobId, Arc<Topic>>,
    next_subscriber: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            next_subscriber: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(&self, state: Arc<JobState>) -> Arc<Topic> {
        let topic = Arc::new(Topic::new(state));
        self.topics.insert(topic.state().id(), Arc::clone(&topic));
        topic
    }

    pub(crate) fn remove(&self, job_id: &JobId) {
        self.topics.remove(job_id);
    }

    pub fn topic(&self, job_id: &JobId) -> Option<Arc<Topic>> {
        // Clone out so the shard guard is released before the topic mutex is taken.
        self.topics.get(job_id).map(|t| Arc::clone(t.value()))
    }

    /// Attach an externally owned sender. The subscriber stays attached until
    /// detached or until its receiver is dropped.
    ///
    /// Returns `Ok(None)` when the receiver is already closed; nothing is
    /// registered in that case.
    pub fn attach(
        &self,
        job_id: JobId,
        tx: mpsc::UnboundedSender<JobEvent>,
    ) -> Result<Option<SubscriberId>, JobError> {
        let topic = self.topic(&job_id).ok_or(JobError::NotFound(job_id))?;
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        if !topic.attach(id, tx) {
            tracing::debug!(job_id = %job_id, "Receiver closed before attach");
            return Ok(None);
        }
        tracing::debug!(job_id = %job_id, subscriber = id, "Subscriber attached");
        Ok(Some(id))
    }

    /// Attach a fresh channel and hand back its receiving end.
    pub fn subscribe(&self, job_id: JobId) -> Result<Subscription, JobError> {
        let topic = self.topic(&job_id).ok_or(JobError::NotFound(job_id))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        topic.attach(id, tx);
        tracing::debug!(job_id = %job_id, subscriber = id, "Subscriber attached");
        Ok(Subscription {
            id,
            job_id,
            topic: Arc::downgrade(&topic),
            rx,
        })
    }

    pub fn publish(&self, job_id: JobId, event: JobEvent) -> Result<(), JobError> {
        let topic = self.topic(&job_id).ok_or(JobError::NotFound(job_id))?;
        topic.publish(event);
        Ok(())
    }

    /// Idempotent; unknown jobs are ignored.
    pub fn detach(&self, job_id: JobId, subscriber: SubscriberId) {
        if let Some(topic) = self.topic(&job_id) {
            topic.detach(subscriber);
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of one subscriber. Detaches itself when dropped.
///
/// Holds only a weak reference to the topic: an evicted job closes the
/// stream instead of being kept alive by its observers.
pub struct Subscription {
    id: SubscriberId,
    job_id: JobId,
    topic: Weak<Topic>,
    rx: mpsc::UnboundedReceiver<JobEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event; `None` once the job has been evicted.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.detach(self.id);
        }
    }
}
