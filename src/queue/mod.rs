//! Durable job queue.
//!
//! Producers enqueue typed payloads; a worker pool claims jobs, dispatches by
//! kind, and acks or nacks them. Delivery is at-least-once: a job may be
//! redelivered after a worker crash, timeout, or explicit nack, so handlers
//! must be idempotent. A job that exhausts its retry budget is routed to the
//! dead-letter state instead of being redelivered.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod sql;

pub use memory::InMemoryJobQueue;
pub use sql::SqlJobQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Payload serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Storage(#[from] sea_orm::error::DbErr),
    #[error("Job {0} not found")]
    JobNotFound(Uuid),
    #[error("Unknown job kind: {0}")]
    UnknownKind(String),
}

/// Closed set of job kinds carried by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    ProcessOrder,
    SyncItem,
    RebuildIndex,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ProcessOrder => "process-order",
            JobKind::SyncItem => "sync-item",
            JobKind::RebuildIndex => "rebuild-index",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "process-order" => Some(JobKind::ProcessOrder),
            "sync-item" => Some(JobKind::SyncItem),
            "rebuild-index" => Some(JobKind::RebuildIndex),
            _ => None,
        }
    }
}

/// Kind-specific job payloads, serialized with the kind as discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobPayload {
    #[serde(rename = "process-order")]
    ProcessOrder { order_id: Uuid },
    #[serde(rename = "sync-item")]
    SyncItem { item_id: Uuid },
    #[serde(rename = "rebuild-index")]
    RebuildIndex,
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::ProcessOrder { .. } => JobKind::ProcessOrder,
            JobPayload::SyncItem { .. } => JobKind::SyncItem,
            JobPayload::RebuildIndex => JobKind::RebuildIndex,
        }
    }
}

/// A claimed unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: JobPayload,
    /// 1 on first delivery, incremented by the queue on each redelivery.
    pub attempt: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// What the queue did with a nacked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Scheduled for redelivery once `available_at` passes.
    Retried { available_at: DateTime<Utc> },
    /// Retry budget exhausted; the job is terminal.
    DeadLettered,
}

/// Redelivery policy shared by queue implementations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with sub-second jitter so redeliveries of a batch
    /// of failures do not land on the same instant.
    pub fn backoff_after(&self, attempts: i32) -> Duration {
        let exp = attempts.max(1).min(16) as u32;
        let backoff_secs = self.base_backoff_secs.saturating_pow(exp) as i64;
        let jitter_ms = Utc::now().timestamp_millis() % 1000;
        Duration::seconds(backoff_secs) + Duration::milliseconds(jitter_ms)
    }
}

/// Queue abstraction over a durable store.
///
/// `claim` must be atomic: two workers never receive the same job. `claim`
/// returns `None` when nothing is eligible; the caller owns the poll loop.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: JobPayload) -> Result<Job, QueueError>;
    async fn claim(&self, kinds: &[JobKind]) -> Result<Option<Job>, QueueError>;
    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError>;
    async fn nack(&self, job_id: Uuid, error: &str) -> Result<NackOutcome, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_kind_discriminator() {
        let order_id = Uuid::new_v4();
        let json = serde_json::to_value(JobPayload::ProcessOrder { order_id }).unwrap();
        assert_eq!(json["kind"], "process-order");
        assert_eq!(json["order_id"], order_id.to_string());

        let json = serde_json::to_value(JobPayload::RebuildIndex).unwrap();
        assert_eq!(json["kind"], "rebuild-index");
    }

    #[test]
    fn payload_kind_matches_enum() {
        assert_eq!(
            JobPayload::SyncItem {
                item_id: Uuid::new_v4()
            }
            .kind(),
            JobKind::SyncItem
        );
        assert_eq!(JobKind::from_str("rebuild-index"), Some(JobKind::RebuildIndex));
        assert_eq!(JobKind::from_str("vacuum"), None);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy::default();
        let first = policy.backoff_after(1);
        let third = policy.backoff_after(3);
        assert!(third > first);
        assert!(first >= Duration::seconds(2));
    }
}
