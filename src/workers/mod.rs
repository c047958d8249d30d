//! Worker pool: a fixed set of concurrent consumers over the job queue.
//!
//! Each worker loops claim -> dispatch -> ack/nack. Retry, backoff, and
//! dead-letter policy live in the queue; handlers only report success,
//! terminal discard, or an error. A handler that neither completes nor fails
//! within the timeout is treated as failed and its job is redelivered.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::queue::{Job, JobKind, JobQueue, NackOutcome};

/// Terminal outcomes a handler can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// The job is acknowledged without effect (e.g. its referent no longer
    /// exists or was already processed). Not an error; not redelivered.
    Discarded(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, ServiceError>;
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    concurrency: usize,
    poll_interval: Duration,
    handler_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        concurrency: usize,
        poll_interval: Duration,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            concurrency: concurrency.max(1),
            poll_interval,
            handler_timeout,
        }
    }

    /// Registers the handler for a job kind. Workers only claim kinds that
    /// have a handler registered.
    pub fn register(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Spawns the workers and returns a handle for graceful shutdown.
    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handlers = Arc::new(self.handlers);
        let kinds: Arc<Vec<JobKind>> = Arc::new(handlers.keys().copied().collect());

        info!(
            concurrency = self.concurrency,
            kinds = ?kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Starting worker pool"
        );

        let mut workers = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                handlers: handlers.clone(),
                kinds: kinds.clone(),
                poll_interval: self.poll_interval,
                handler_timeout: self.handler_timeout,
                shutdown: shutdown_rx.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            workers,
        }
    }
}

pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signals shutdown and waits for in-flight jobs to finish. Workers are
    /// not preempted mid-handler; they stop at the next loop iteration.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                error!("Worker task panicked: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    handlers: Arc<HashMap<JobKind, Arc<dyn JobHandler>>>,
    kinds: Arc<Vec<JobKind>>,
    poll_interval: Duration,
    handler_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.queue.claim(&self.kinds).await {
                Ok(Some(job)) => self.dispatch(job).await,
                Ok(None) => {
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(worker = self.id, "Queue claim failed: {}", e);
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn dispatch(&self, job: Job) {
        let Some(handler) = self.handlers.get(&job.kind) else {
            // Kinds are derived from the registry, so this only happens if a
            // registration was removed at runtime; surface it via retry.
            self.fail(&job, "no handler registered for kind").await;
            return;
        };

        match timeout(self.handler_timeout, handler.handle(&job)).await {
            Ok(Ok(JobOutcome::Completed)) => {
                if let Err(e) = self.queue.ack(job.id).await {
                    error!(worker = self.id, job_id = %job.id, "Ack failed: {}", e);
                }
            }
            Ok(Ok(JobOutcome::Discarded(reason))) => {
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    kind = job.kind.as_str(),
                    "Discarding job: {}",
                    reason
                );
                if let Err(e) = self.queue.ack(job.id).await {
                    error!(worker = self.id, job_id = %job.id, "Ack failed: {}", e);
                }
            }
            Ok(Err(err)) if !err.is_retryable() => {
                // Validation-class and not-found failures cannot self-resolve;
                // redelivering them forever would just churn the queue.
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    kind = job.kind.as_str(),
                    "Terminal handler failure, discarding: {}",
                    err
                );
                if let Err(e) = self.queue.ack(job.id).await {
                    error!(worker = self.id, job_id = %job.id, "Ack failed: {}", e);
                }
            }
            Ok(Err(err)) => self.fail(&job, &err.to_string()).await,
            Err(_elapsed) => {
                self.fail(&job, &format!("handler timed out after {:?}", self.handler_timeout))
                    .await
            }
        }
    }

    async fn fail(&self, job: &Job, reason: &str) {
        match self.queue.nack(job.id, reason).await {
            Ok(NackOutcome::Retried { available_at }) => {
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    attempt = job.attempt,
                    available_at = %available_at,
                    "Job failed, scheduled for redelivery: {}",
                    reason
                );
            }
            Ok(NackOutcome::DeadLettered) => {
                error!(
                    worker = self.id,
                    job_id = %job.id,
                    attempts = job.attempt,
                    "Job failed permanently: {}",
                    reason
                );
            }
            Err(e) => {
                error!(worker = self.id, job_id = %job.id, "Nack failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InMemoryJobQueue, JobPayload, RetryPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<JobOutcome, ServiceError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutcome::Completed)
        }
    }

    struct StallingHandler;

    #[async_trait]
    impl JobHandler for StallingHandler {
        async fn handle(&self, _job: &Job) -> Result<JobOutcome, ServiceError> {
            sleep(Duration::from_secs(60)).await;
            Ok(JobOutcome::Completed)
        }
    }

    #[tokio::test]
    async fn pool_drains_jobs_and_stops() {
        let queue = Arc::new(InMemoryJobQueue::new());
        for _ in 0..5 {
            queue
                .enqueue(JobPayload::SyncItem {
                    item_id: Uuid::new_v4(),
                })
                .await
                .unwrap();
        }

        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new(
            queue.clone(),
            2,
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        pool.register(JobKind::SyncItem, handler.clone());
        let handle = pool.start();

        for _ in 0..100 {
            if handler.seen.load(Ordering::SeqCst) == 5 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        handle.stop().await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 5);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn timed_out_handler_is_nacked() {
        let queue = Arc::new(InMemoryJobQueue::with_policy(RetryPolicy {
            max_attempts: 1,
            base_backoff_secs: 1,
        }));
        queue.enqueue(JobPayload::RebuildIndex).await.unwrap();

        let mut pool = WorkerPool::new(
            queue.clone(),
            1,
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        pool.register(JobKind::RebuildIndex, Arc::new(StallingHandler));
        let handle = pool.start();

        for _ in 0..100 {
            if !queue.dead_jobs().is_empty() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        handle.stop().await;

        // max_attempts = 1, so the first timeout dead-letters the job.
        assert_eq!(queue.dead_jobs().len(), 1);
    }
}
