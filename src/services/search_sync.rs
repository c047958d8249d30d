//! Search-index synchronization job handlers.
//!
//! The index engine itself is an external collaborator; this module owns
//! only the job contract. `sync-item` pushes one item's current stock view,
//! `rebuild-index` asks the collaborator for a full rebuild.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::inventory_record::{self, Entity as InventoryRecordEntity};
use crate::errors::ServiceError;
use crate::queue::{Job, JobPayload};
use crate::services::inventory::StockView;
use crate::workers::{JobHandler, JobOutcome};

/// Boundary to the external search index.
#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    async fn sync_item(&self, view: &StockView) -> Result<(), ServiceError>;
    async fn rebuild(&self) -> Result<(), ServiceError>;
}

/// Default collaborator used when no real index is wired up: it just logs.
pub struct LoggingSearchIndexClient;

#[async_trait]
impl SearchIndexClient for LoggingSearchIndexClient {
    async fn sync_item(&self, view: &StockView) -> Result<(), ServiceError> {
        info!(
            item_id = %view.item_id,
            available_quantity = view.available_quantity,
            "Search index sync (logging client)"
        );
        Ok(())
    }

    async fn rebuild(&self) -> Result<(), ServiceError> {
        info!("Search index rebuild (logging client)");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SearchSyncHandler {
    db: Arc<DatabaseConnection>,
    index: Arc<dyn SearchIndexClient>,
}

impl SearchSyncHandler {
    pub fn new(db: Arc<DatabaseConnection>, index: Arc<dyn SearchIndexClient>) -> Self {
        Self { db, index }
    }

    /// A missing record is synced as the zero-default view, mirroring
    /// `get_inventory`: an unknown item is "no stock", not an error.
    #[instrument(skip(self))]
    async fn sync_item(&self, item_id: Uuid) -> Result<JobOutcome, ServiceError> {
        let view = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ItemId.eq(item_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(StockView::from)
            .unwrap_or_else(|| StockView::empty(item_id));

        self.index.sync_item(&view).await?;
        Ok(JobOutcome::Completed)
    }
}

#[async_trait]
impl JobHandler for SearchSyncHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, ServiceError> {
        match &job.payload {
            JobPayload::SyncItem { item_id } => self.sync_item(*item_id).await,
            JobPayload::RebuildIndex => {
                self.index.rebuild().await?;
                Ok(JobOutcome::Completed)
            }
            JobPayload::ProcessOrder { .. } => Err(ServiceError::ValidationError(
                "search-sync handler received a 'process-order' payload".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        pub IndexClient {}

        #[async_trait]
        impl SearchIndexClient for IndexClient {
            async fn sync_item(&self, view: &StockView) -> Result<(), ServiceError>;
            async fn rebuild(&self) -> Result<(), ServiceError>;
        }
    }

    #[tokio::test]
    async fn sync_passes_the_view_through() {
        let item_id = Uuid::new_v4();
        let mut mock = MockIndexClient::new();
        mock.expect_sync_item()
            .withf(move |view| view.item_id == item_id && view.available_quantity == 0)
            .times(1)
            .returning(|_| Ok(()));

        let view = StockView::empty(item_id);
        mock.sync_item(&view).await.unwrap();
    }

    #[tokio::test]
    async fn failed_rebuild_propagates_for_redelivery() {
        let mut mock = MockIndexClient::new();
        mock.expect_rebuild()
            .times(1)
            .returning(|| Err(ServiceError::InternalError("index unreachable".to_string())));

        let err = mock.rebuild().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
