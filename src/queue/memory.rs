//! In-memory queue implementation.
//!
//! Same claim/ack/nack semantics as the durable queue, minus durability.
//! Used by tests and local development; the state lives behind one mutex so
//! claims are trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::events::{Event, EventSender};
use crate::queue::{Job, JobKind, JobPayload, JobQueue, NackOutcome, QueueError, RetryPolicy};

#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    available_at: DateTime<Utc>,
    last_error: Option<String>,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<StoredJob>,
    processing: HashMap<Uuid, StoredJob>,
    dead: Vec<StoredJob>,
}

pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    policy: RetryPolicy,
    event_sender: Option<EventSender>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            policy,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Number of jobs waiting for a claim (test/inspection helper).
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Jobs routed to the dead-letter state (test/inspection helper).
    pub fn dead_jobs(&self) -> Vec<Job> {
        self.state
            .lock()
            .unwrap()
            .dead
            .iter()
            .map(|s| s.job.clone())
            .collect()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<Job, QueueError> {
        let job = Job {
            id: Uuid::new_v4(),
            kind: payload.kind(),
            payload,
            attempt: 0,
            enqueued_at: Utc::now(),
        };
        let mut state = self.state.lock().unwrap();
        state.pending.push(StoredJob {
            job: job.clone(),
            available_at: job.enqueued_at,
            last_error: None,
        });
        Ok(job)
    }

    async fn claim(&self, kinds: &[JobKind]) -> Result<Option<Job>, QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let position = state
            .pending
            .iter()
            .position(|s| kinds.contains(&s.job.kind) && s.available_at <= now);
        let Some(position) = position else {
            return Ok(None);
        };

        let mut stored = state.pending.remove(position);
        stored.job.attempt += 1;
        let job = stored.job.clone();
        state.processing.insert(job.id, stored);
        Ok(Some(job))
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state
            .processing
            .remove(&job_id)
            .map(|_| ())
            .ok_or(QueueError::JobNotFound(job_id))
    }

    async fn nack(&self, job_id: Uuid, error: &str) -> Result<NackOutcome, QueueError> {
        let (outcome, dead_event) = {
            let mut state = self.state.lock().unwrap();
            let mut stored = state
                .processing
                .remove(&job_id)
                .ok_or(QueueError::JobNotFound(job_id))?;
            stored.last_error = Some(error.to_string());

            if stored.job.attempt >= self.policy.max_attempts {
                let event = Event::JobDeadLettered {
                    job_id,
                    kind: stored.job.kind.as_str().to_string(),
                    attempts: stored.job.attempt,
                    error: error.to_string(),
                    dead_at: Utc::now(),
                };
                state.dead.push(stored);
                (NackOutcome::DeadLettered, Some(event))
            } else {
                let available_at = Utc::now() + self.policy.backoff_after(stored.job.attempt);
                stored.available_at = available_at;
                state.pending.push(stored);
                (NackOutcome::Retried { available_at }, None)
            }
        };

        if let (Some(event), Some(sender)) = (dead_event, self.event_sender.as_ref()) {
            if let Err(e) = sender.send(event).await {
                warn!(job_id = %job_id, "Failed to emit dead-letter event: {}", e);
            }
        }
        Ok(outcome)
    }
}
