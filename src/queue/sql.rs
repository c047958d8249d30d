//! Database-backed queue implementation.
//!
//! The claim path is atomic on every supported backend: Postgres uses a
//! `FOR UPDATE SKIP LOCKED` claim-and-mark statement; other backends fall
//! back to a candidate scan with a status-guarded compare-and-set, so two
//! workers can never walk away with the same job.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::queue_job::{self, Entity as QueueJobEntity, JobStatus};
use crate::events::{Event, EventSender};
use crate::queue::{Job, JobKind, JobPayload, JobQueue, NackOutcome, QueueError, RetryPolicy};

#[derive(Clone)]
pub struct SqlJobQueue {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    event_sender: EventSender,
}

impl SqlJobQueue {
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy, event_sender: EventSender) -> Self {
        Self {
            db,
            policy,
            event_sender,
        }
    }

    fn job_from_model(model: queue_job::Model) -> Result<Job, QueueError> {
        let kind = JobKind::from_str(&model.kind)
            .ok_or_else(|| QueueError::UnknownKind(model.kind.clone()))?;
        let payload: JobPayload = serde_json::from_value(model.payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        Ok(Job {
            id: model.id,
            kind,
            payload,
            attempt: model.attempts,
            enqueued_at: model.enqueued_at,
        })
    }

    /// Claim-and-mark in one statement; Postgres only.
    async fn claim_postgres(&self, kinds: &[JobKind]) -> Result<Option<Job>, QueueError> {
        let placeholders: Vec<String> = (0..kinds.len()).map(|i| format!("${}", i + 1)).collect();
        let sql = format!(
            r#"
            WITH cte AS (
                SELECT id FROM queue_jobs
                WHERE status = 'pending' AND available_at <= NOW() AND kind IN ({})
                ORDER BY enqueued_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE queue_jobs q
            SET status = 'processing', claimed_at = NOW(), attempts = q.attempts + 1
            FROM cte
            WHERE q.id = cte.id
            RETURNING q.id, q.kind, q.payload, q.attempts, q.enqueued_at
            "#,
            placeholders.join(", ")
        );
        let values: Vec<sea_orm::Value> = kinds.iter().map(|k| k.as_str().into()).collect();
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);

        let row = match self.db.query_one(stmt).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let model = queue_job::Model {
            id: row.try_get("", "id")?,
            kind: row.try_get("", "kind")?,
            payload: row.try_get("", "payload")?,
            status: JobStatus::Processing.as_str().to_string(),
            attempts: row.try_get("", "attempts")?,
            max_attempts: self.policy.max_attempts,
            available_at: Utc::now(),
            enqueued_at: row.try_get("", "enqueued_at")?,
            claimed_at: Some(Utc::now()),
            completed_at: None,
            last_error: None,
        };
        Self::job_from_model(model).map(Some)
    }

    /// Portable claim: scan a few eligible candidates, then CAS one of them
    /// from `pending` to `processing`. Losing a race moves on to the next
    /// candidate.
    async fn claim_cas(&self, kinds: &[JobKind]) -> Result<Option<Job>, QueueError> {
        let now = Utc::now();
        let kind_strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();

        let candidates = QueueJobEntity::find()
            .filter(queue_job::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(queue_job::Column::AvailableAt.lte(now))
            .filter(queue_job::Column::Kind.is_in(kind_strs))
            .order_by_asc(queue_job::Column::EnqueuedAt)
            .limit(5)
            .all(&*self.db)
            .await?;

        for candidate in candidates {
            let claimed = QueueJobEntity::update_many()
                .col_expr(
                    queue_job::Column::Status,
                    Expr::value(JobStatus::Processing.as_str()),
                )
                .col_expr(
                    queue_job::Column::Attempts,
                    Expr::value(candidate.attempts + 1),
                )
                .col_expr(queue_job::Column::ClaimedAt, Expr::value(Some(now)))
                .filter(queue_job::Column::Id.eq(candidate.id))
                .filter(queue_job::Column::Status.eq(JobStatus::Pending.as_str()))
                .filter(queue_job::Column::Attempts.eq(candidate.attempts))
                .exec(&*self.db)
                .await?;

            if claimed.rows_affected == 1 {
                let mut model = candidate;
                model.attempts += 1;
                model.status = JobStatus::Processing.as_str().to_string();
                return Self::job_from_model(model).map(Some);
            }
            debug!(job_id = %candidate.id, "Lost claim race, trying next candidate");
        }
        Ok(None)
    }
}

#[async_trait]
impl JobQueue for SqlJobQueue {
    #[instrument(skip(self, payload), fields(kind = payload.kind().as_str()))]
    async fn enqueue(&self, payload: JobPayload) -> Result<Job, QueueError> {
        let id = Uuid::new_v4();
        let kind = payload.kind();
        let now = Utc::now();
        let body = serde_json::to_value(&payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let active = queue_job::ActiveModel {
            id: Set(id),
            kind: Set(kind.as_str().to_string()),
            payload: Set(body),
            status: Set(JobStatus::Pending.as_str().to_string()),
            attempts: Set(0),
            max_attempts: Set(self.policy.max_attempts),
            available_at: Set(now),
            enqueued_at: Set(now),
            claimed_at: Set(None),
            completed_at: Set(None),
            last_error: Set(None),
        };
        active.insert(&*self.db).await?;

        debug!(job_id = %id, "Enqueued job");
        Ok(Job {
            id,
            kind,
            payload,
            attempt: 0,
            enqueued_at: now,
        })
    }

    async fn claim(&self, kinds: &[JobKind]) -> Result<Option<Job>, QueueError> {
        if kinds.is_empty() {
            return Ok(None);
        }
        if self.db.get_database_backend() == DbBackend::Postgres {
            self.claim_postgres(kinds).await
        } else {
            self.claim_cas(kinds).await
        }
    }

    #[instrument(skip(self))]
    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let result = QueueJobEntity::update_many()
            .col_expr(
                queue_job::Column::Status,
                Expr::value(JobStatus::Completed.as_str()),
            )
            .col_expr(
                queue_job::Column::CompletedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(queue_job::Column::Id.eq(job_id))
            .filter(queue_job::Column::Status.eq(JobStatus::Processing.as_str()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn nack(&self, job_id: Uuid, error: &str) -> Result<NackOutcome, QueueError> {
        let model = QueueJobEntity::find_by_id(job_id)
            .one(&*self.db)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        if model.attempts >= model.max_attempts {
            let mut active: queue_job::ActiveModel = model.clone().into();
            active.status = Set(JobStatus::Dead.as_str().to_string());
            active.last_error = Set(Some(error.to_string()));
            active.update(&*self.db).await?;

            let dead_at = Utc::now();
            if let Err(e) = self
                .event_sender
                .send(Event::JobDeadLettered {
                    job_id,
                    kind: model.kind.clone(),
                    attempts: model.attempts,
                    error: error.to_string(),
                    dead_at,
                })
                .await
            {
                warn!(job_id = %job_id, "Failed to emit dead-letter event: {}", e);
            }
            return Ok(NackOutcome::DeadLettered);
        }

        let available_at = Utc::now() + self.policy.backoff_after(model.attempts);
        let mut active: queue_job::ActiveModel = model.into();
        active.status = Set(JobStatus::Pending.as_str().to_string());
        active.available_at = Set(available_at);
        active.last_error = Set(Some(error.to_string()));
        active.update(&*self.db).await?;

        Ok(NackOutcome::Retried { available_at })
    }
}
