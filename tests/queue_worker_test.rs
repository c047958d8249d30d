mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::EntityTrait;
use tokio::time::sleep;
use uuid::Uuid;

use stockpile_api::db::{self, DbConfig};
use stockpile_api::entities::queue_job::{self, Entity as QueueJobEntity};
use stockpile_api::errors::ServiceError;
use stockpile_api::events::Event;
use stockpile_api::queue::{
    Job, JobKind, JobPayload, JobQueue, NackOutcome, RetryPolicy, SqlJobQueue,
};
use stockpile_api::workers::{JobHandler, JobOutcome, WorkerPool};

async fn sql_queue(policy: RetryPolicy) -> (SqlJobQueue, Arc<sea_orm::DatabaseConnection>, tokio::sync::mpsc::Receiver<Event>) {
    let db = common::setup_test_db().await;
    let (sender, rx) = common::event_channel();
    (SqlJobQueue::new(db.clone(), policy, sender), db, rx)
}

#[tokio::test]
async fn enqueue_claim_ack_cycle() {
    let (queue, db, _rx) = sql_queue(RetryPolicy::default()).await;
    let order_id = Uuid::new_v4();

    let job = queue
        .enqueue(JobPayload::ProcessOrder { order_id })
        .await
        .unwrap();
    assert_eq!(job.kind, JobKind::ProcessOrder);
    assert_eq!(job.attempt, 0);

    let claimed = queue
        .claim(&[JobKind::ProcessOrder])
        .await
        .unwrap()
        .expect("job claimable");
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.attempt, 1);
    assert_eq!(claimed.payload, JobPayload::ProcessOrder { order_id });

    // A processing job is invisible to further claims.
    assert!(queue.claim(&[JobKind::ProcessOrder]).await.unwrap().is_none());

    queue.ack(claimed.id).await.unwrap();
    let row = QueueJobEntity::find_by_id(job.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "completed");
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn claim_filters_by_kind_and_orders_by_enqueue_time() {
    let (queue, _db, _rx) = sql_queue(RetryPolicy::default()).await;

    let first = queue
        .enqueue(JobPayload::SyncItem {
            item_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    let _other_kind = queue.enqueue(JobPayload::RebuildIndex).await.unwrap();
    let second = queue
        .enqueue(JobPayload::SyncItem {
            item_id: Uuid::new_v4(),
        })
        .await
        .unwrap();

    let claimed = queue.claim(&[JobKind::SyncItem]).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    let claimed = queue.claim(&[JobKind::SyncItem]).await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);
    assert!(queue.claim(&[JobKind::SyncItem]).await.unwrap().is_none());
}

#[tokio::test]
async fn nack_backs_off_and_increments_attempts() {
    let (queue, db, _rx) = sql_queue(RetryPolicy::default()).await;
    let job = queue.enqueue(JobPayload::RebuildIndex).await.unwrap();

    let claimed = queue.claim(&[JobKind::RebuildIndex]).await.unwrap().unwrap();
    let outcome = queue.nack(claimed.id, "index offline").await.unwrap();
    let NackOutcome::Retried { available_at } = outcome else {
        panic!("expected Retried, got {:?}", outcome);
    };
    assert!(available_at > chrono::Utc::now());

    // Backed off: not immediately eligible again.
    assert!(queue.claim(&[JobKind::RebuildIndex]).await.unwrap().is_none());

    let row = QueueJobEntity::find_by_id(job.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.attempts, 1);
    assert_eq!(row.last_error.as_deref(), Some("index offline"));
}

#[tokio::test]
async fn exhausted_retry_budget_dead_letters_with_event() {
    let policy = RetryPolicy {
        max_attempts: 1,
        base_backoff_secs: 1,
    };
    let (queue, db, mut rx) = sql_queue(policy).await;
    let job = queue.enqueue(JobPayload::RebuildIndex).await.unwrap();

    let claimed = queue.claim(&[JobKind::RebuildIndex]).await.unwrap().unwrap();
    let outcome = queue.nack(claimed.id, "index offline").await.unwrap();
    assert_eq!(outcome, NackOutcome::DeadLettered);

    let row = QueueJobEntity::find_by_id(job.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "dead");

    match rx.recv().await {
        Some(Event::JobDeadLettered {
            job_id,
            kind,
            attempts,
            ..
        }) => {
            assert_eq!(job_id, job.id);
            assert_eq!(kind, "rebuild-index");
            assert_eq!(attempts, 1);
        }
        other => panic!("expected JobDeadLettered event, got {:?}", other),
    }

    // Dead jobs are terminal: never redelivered.
    assert!(queue.claim(&[JobKind::RebuildIndex]).await.unwrap().is_none());
}

#[tokio::test]
async fn jobs_survive_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("queue.db").display());
    let db_cfg = DbConfig {
        url,
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };

    let order_id = Uuid::new_v4();
    let job_id;
    {
        let pool = db::establish_connection_with_config(&db_cfg).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let (sender, _rx) = common::event_channel();
        let queue = SqlJobQueue::new(Arc::new(pool), RetryPolicy::default(), sender);
        let job = queue
            .enqueue(JobPayload::ProcessOrder { order_id })
            .await
            .unwrap();
        job_id = job.id;
    }

    // "Restart": a fresh pool over the same file still sees the job.
    let pool = db::establish_connection_with_config(&db_cfg).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let (sender, _rx) = common::event_channel();
    let queue = SqlJobQueue::new(Arc::new(pool), RetryPolicy::default(), sender);

    let claimed = queue
        .claim(&[JobKind::ProcessOrder])
        .await
        .unwrap()
        .expect("job survived restart");
    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.payload, JobPayload::ProcessOrder { order_id });
}

struct RecordingHandler {
    handled: AtomicUsize,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, _job: &Job) -> Result<JobOutcome, ServiceError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(JobOutcome::Completed)
    }
}

#[tokio::test]
async fn worker_pool_drains_durable_queue() {
    let (queue, db, _rx) = sql_queue(RetryPolicy::default()).await;
    let queue = Arc::new(queue);

    for _ in 0..4 {
        queue
            .enqueue(JobPayload::SyncItem {
                item_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
    }

    let handler = Arc::new(RecordingHandler {
        handled: AtomicUsize::new(0),
    });
    let mut pool = WorkerPool::new(
        queue.clone(),
        2,
        Duration::from_millis(20),
        Duration::from_secs(5),
    );
    pool.register(JobKind::SyncItem, handler.clone());
    let handle = pool.start();

    for _ in 0..200 {
        if handler.handled.load(Ordering::SeqCst) == 4 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    handle.stop().await;
    assert_eq!(handler.handled.load(Ordering::SeqCst), 4);

    let rows = QueueJobEntity::find().all(&*db).await.unwrap();
    assert!(rows
        .iter()
        .all(|r| r.status == queue_job::JobStatus::Completed.as_str()));
}

struct AlwaysFailingHandler;

#[async_trait]
impl JobHandler for AlwaysFailingHandler {
    async fn handle(&self, _job: &Job) -> Result<JobOutcome, ServiceError> {
        Err(ServiceError::InternalError("boom".to_string()))
    }
}

#[tokio::test]
async fn failing_handler_ends_in_dead_letter() {
    let policy = RetryPolicy {
        max_attempts: 1,
        base_backoff_secs: 1,
    };
    let (queue, db, _rx) = sql_queue(policy).await;
    let queue = Arc::new(queue);
    let job = queue.enqueue(JobPayload::RebuildIndex).await.unwrap();

    let mut pool = WorkerPool::new(
        queue.clone(),
        1,
        Duration::from_millis(20),
        Duration::from_secs(5),
    );
    pool.register(JobKind::RebuildIndex, Arc::new(AlwaysFailingHandler));
    let handle = pool.start();

    let mut dead = false;
    for _ in 0..200 {
        let row = QueueJobEntity::find_by_id(job.id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        if row.status == "dead" {
            dead = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    handle.stop().await;
    assert!(dead, "job should have been dead-lettered");
}
