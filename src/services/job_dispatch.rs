//! Producer surface for collaborators on the request path.
//!
//! Checkout enqueues fulfillment after it has reserved stock; catalog
//! writes enqueue index synchronization. Each call returns the job id for
//! tracing; completion is always asynchronous.

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::queue::{JobPayload, JobQueue};

#[derive(Clone)]
pub struct JobDispatchService {
    queue: Arc<dyn JobQueue>,
}

impl JobDispatchService {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    #[instrument(skip(self))]
    pub async fn enqueue_order_fulfillment(&self, order_id: Uuid) -> Result<Uuid, ServiceError> {
        let job = self
            .queue
            .enqueue(JobPayload::ProcessOrder { order_id })
            .await?;
        Ok(job.id)
    }

    #[instrument(skip(self))]
    pub async fn enqueue_item_sync(&self, item_id: Uuid) -> Result<Uuid, ServiceError> {
        let job = self.queue.enqueue(JobPayload::SyncItem { item_id }).await?;
        Ok(job.id)
    }

    #[instrument(skip(self))]
    pub async fn enqueue_index_rebuild(&self) -> Result<Uuid, ServiceError> {
        let job = self.queue.enqueue(JobPayload::RebuildIndex).await?;
        Ok(job.id)
    }
}
