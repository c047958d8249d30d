//! Append-only audit trail of ledger mutations.
//!
//! `append` is crate-private and only reachable from the ledger's own
//! transaction, which is what keeps counters and log from skewing: callers
//! outside the ledger cannot write entries, and nothing in this module can
//! update or delete one.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::inventory_log_entry::{
    self, Entity as InventoryLogEntryEntity, InventoryAction,
};
use crate::errors::ServiceError;

/// A log entry ready to be written; snapshots are taken by the ledger while
/// it holds the record row.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub inventory_id: Uuid,
    pub item_id: Uuid,
    pub action: InventoryAction,
    pub quantity_change: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub reserved_before: i32,
    pub reserved_after: i32,
    pub reason: Option<String>,
    pub performed_by: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
}

/// Writes one entry inside the caller's transaction. If this fails the
/// ledger's counter mutation rolls back with it.
pub(crate) async fn append<C: ConnectionTrait>(
    conn: &C,
    entry: NewLogEntry,
) -> Result<inventory_log_entry::Model, ServiceError> {
    let active = inventory_log_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_id: Set(entry.inventory_id),
        item_id: Set(entry.item_id),
        action: Set(entry.action.as_str().to_string()),
        quantity_change: Set(entry.quantity_change),
        quantity_before: Set(entry.quantity_before),
        quantity_after: Set(entry.quantity_after),
        reserved_before: Set(entry.reserved_before),
        reserved_after: Set(entry.reserved_after),
        reason: Set(entry.reason),
        performed_by: Set(entry.performed_by),
        order_line_id: Set(entry.order_line_id),
        created_at: Set(chrono::Utc::now()),
    };
    active.insert(conn).await.map_err(ServiceError::db_error)
}

/// Paginated read side for reconciliation tooling, newest first.
#[instrument(skip(db))]
pub async fn list_for_item(
    db: &DatabaseConnection,
    item_id: Uuid,
    page: u64,
    limit: u64,
) -> Result<(Vec<inventory_log_entry::Model>, u64), ServiceError> {
    if page == 0 {
        return Err(ServiceError::ValidationError(
            "Page number must be greater than 0".to_string(),
        ));
    }
    if limit == 0 || limit > 1000 {
        return Err(ServiceError::ValidationError(
            "Limit must be between 1 and 1000".to_string(),
        ));
    }

    let paginator = InventoryLogEntryEntity::find()
        .filter(inventory_log_entry::Column::ItemId.eq(item_id))
        .order_by_desc(inventory_log_entry::Column::CreatedAt)
        .paginate(db, limit);

    let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
    let entries = paginator
        .fetch_page(page - 1)
        .await
        .map_err(ServiceError::db_error)?;

    Ok((entries, total))
}
