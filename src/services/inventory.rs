//! Inventory ledger.
//!
//! All stock counters move through `apply_action`. A mutation and its audit
//! entry commit in one transaction; the record row is guarded by a version
//! compare-and-set so concurrent writers to the same item serialize, while
//! different items proceed independently.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::inventory_log_entry::InventoryAction;
use crate::entities::inventory_record::{self, Entity as InventoryRecordEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, NewLogEntry};

/// Bounded optimistic-lock retries before giving up with `Conflict`.
const MAX_TRANSITION_RETRIES: usize = 5;

/// One requested ledger transition.
#[derive(Debug, Clone)]
pub struct StockAction {
    pub item_id: Uuid,
    pub action: InventoryAction,
    pub quantity: i32,
    /// Required when the action may lazily create the record.
    pub sku: Option<String>,
    pub reason: Option<String>,
    /// Absent for system-driven actions.
    pub performed_by: Option<Uuid>,
    /// Links `Sale` entries to the originating order line.
    pub order_line_id: Option<Uuid>,
}

impl StockAction {
    pub fn new(item_id: Uuid, action: InventoryAction, quantity: i32) -> Self {
        Self {
            item_id,
            action,
            quantity,
            sku: None,
            reason: None,
            performed_by: None,
            order_line_id: None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.performed_by = Some(actor);
        self
    }

    pub fn with_order_line(mut self, order_line_id: Uuid) -> Self {
        self.order_line_id = Some(order_line_id);
        self
    }
}

/// Read-side view; synthesized with zero counters for unknown items so
/// callers can render "no stock" without a not-found branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockView {
    pub item_id: Uuid,
    pub sku: Option<String>,
    pub quantity_in_stock: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
}

impl StockView {
    pub fn empty(item_id: Uuid) -> Self {
        Self {
            item_id,
            sku: None,
            quantity_in_stock: 0,
            reserved_quantity: 0,
            available_quantity: 0,
        }
    }
}

impl From<inventory_record::Model> for StockView {
    fn from(model: inventory_record::Model) -> Self {
        Self {
            item_id: model.item_id,
            sku: Some(model.sku),
            quantity_in_stock: model.quantity_in_stock,
            reserved_quantity: model.reserved_quantity,
            available_quantity: model.available_quantity,
        }
    }
}

/// Service for managing the inventory ledger.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Applies one ledger transition and returns the updated record.
    ///
    /// The counter mutation and its audit entry commit atomically; on
    /// failure nothing is applied. Emits `InventoryAdjusted` after commit.
    #[instrument(skip(self, action), fields(item_id = %action.item_id, action = action.action.as_str(), quantity = action.quantity))]
    pub async fn apply_action(
        &self,
        action: StockAction,
    ) -> Result<inventory_record::Model, ServiceError> {
        validate(&action)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let (record, event) = match apply_action_in(&txn, &action).await {
            Ok(applied) => applied,
            Err(e) => {
                // Roll back explicitly so the error path never leaves a
                // half-open transaction behind.
                let _ = txn.rollback().await;
                return Err(e);
            }
        };
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Err(e) = self.event_sender.send(event).await {
            warn!(item_id = %action.item_id, "Failed to emit inventory event: {}", e);
        }
        info!(
            item_id = %record.item_id,
            quantity_in_stock = record.quantity_in_stock,
            reserved_quantity = record.reserved_quantity,
            available_quantity = record.available_quantity,
            "Applied inventory action"
        );
        Ok(record)
    }

    /// Never errors on a missing record; returns an all-zero view instead.
    #[instrument(skip(self))]
    pub async fn get_inventory(&self, item_id: Uuid) -> Result<StockView, ServiceError> {
        let record = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ItemId.eq(item_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(record
            .map(StockView::from)
            .unwrap_or_else(|| StockView::empty(item_id)))
    }

    /// Paginated admin listing of all records.
    #[instrument(skip(self))]
    pub async fn list_inventory(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_record::Model>, u64), ServiceError> {
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

        let paginator = InventoryRecordEntity::find().paginate(&*self.db, limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let records = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((records, total))
    }
}

pub(crate) fn validate(action: &StockAction) -> Result<(), ServiceError> {
    if action.quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be a positive integer, got {}",
            action.quantity
        )));
    }
    if let Some(sku) = &action.sku {
        if sku.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Sku must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Applies a validated transition inside the caller's transaction.
///
/// Used directly by the fulfillment handler so that a multi-line order and
/// its status change share one atomic unit. Returns the updated record and
/// the event to emit once the caller commits.
pub(crate) async fn apply_action_in<C: ConnectionTrait>(
    conn: &C,
    action: &StockAction,
) -> Result<(inventory_record::Model, Event), ServiceError> {
    for _ in 0..MAX_TRANSITION_RETRIES {
        let record = fetch_or_create(conn, action).await?;
        let next = transition(&record, action)?;

        // Version-guarded write: zero rows means a concurrent writer moved
        // the row first, so re-read and recompute.
        let updated_at = Utc::now();
        let result = InventoryRecordEntity::update_many()
            .col_expr(
                inventory_record::Column::QuantityInStock,
                Expr::value(next.quantity_in_stock),
            )
            .col_expr(
                inventory_record::Column::ReservedQuantity,
                Expr::value(next.reserved_quantity),
            )
            .col_expr(
                inventory_record::Column::AvailableQuantity,
                Expr::value(next.available_quantity),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::value(record.version + 1),
            )
            .col_expr(
                inventory_record::Column::UpdatedAt,
                Expr::value(Some(updated_at)),
            )
            .filter(inventory_record::Column::Id.eq(record.id))
            .filter(inventory_record::Column::Version.eq(record.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            continue;
        }

        audit::append(
            conn,
            NewLogEntry {
                inventory_id: record.id,
                item_id: record.item_id,
                action: action.action,
                quantity_change: next.quantity_in_stock - record.quantity_in_stock,
                quantity_before: record.quantity_in_stock,
                quantity_after: next.quantity_in_stock,
                reserved_before: record.reserved_quantity,
                reserved_after: next.reserved_quantity,
                reason: action.reason.clone(),
                performed_by: action.performed_by,
                order_line_id: action.order_line_id,
            },
        )
        .await?;

        let event = Event::InventoryAdjusted {
            item_id: record.item_id,
            action: action.action.as_str().to_string(),
            quantity_change: next.quantity_in_stock - record.quantity_in_stock,
            quantity_before: record.quantity_in_stock,
            quantity_after: next.quantity_in_stock,
            reserved_before: record.reserved_quantity,
            reserved_after: next.reserved_quantity,
        };

        let updated = inventory_record::Model {
            quantity_in_stock: next.quantity_in_stock,
            reserved_quantity: next.reserved_quantity,
            available_quantity: next.available_quantity,
            version: record.version + 1,
            updated_at: Some(updated_at),
            ..record
        };
        return Ok((updated, event));
    }

    Err(ServiceError::Conflict(format!(
        "Gave up updating inventory for item {} after {} optimistic-lock retries",
        action.item_id, MAX_TRANSITION_RETRIES
    )))
}

/// Create-or-fetch inside the mutation's own transaction, never a separate
/// unguarded read-then-write. Only stock-increasing actions may create, and
/// they need a sku to do it.
async fn fetch_or_create<C: ConnectionTrait>(
    conn: &C,
    action: &StockAction,
) -> Result<inventory_record::Model, ServiceError> {
    let existing = InventoryRecordEntity::find()
        .filter(inventory_record::Column::ItemId.eq(action.item_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if let Some(record) = existing {
        return Ok(record);
    }

    if !action.action.is_stock_increasing() {
        // Missing record means zero everywhere; report the rule that a zero
        // counter cannot satisfy.
        return Err(match action.action {
            InventoryAction::Sale | InventoryAction::Release => {
                ServiceError::InsufficientReservation {
                    item_id: action.item_id,
                    requested: action.quantity,
                    quantity_in_stock: 0,
                    reserved_quantity: 0,
                    available_quantity: 0,
                }
            }
            _ => ServiceError::InsufficientStock {
                item_id: action.item_id,
                requested: action.quantity,
                quantity_in_stock: 0,
                reserved_quantity: 0,
                available_quantity: 0,
            },
        });
    }

    let sku = action
        .sku
        .clone()
        .ok_or(ServiceError::MissingSku {
            item_id: action.item_id,
        })?;

    let active = inventory_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(action.item_id),
        sku: Set(sku),
        quantity_in_stock: Set(0),
        reserved_quantity: Set(0),
        available_quantity: Set(0),
        version: Set(0),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    };
    active.insert(conn).await.map_err(ServiceError::db_error)
}

#[derive(Debug)]
struct Counters {
    quantity_in_stock: i32,
    reserved_quantity: i32,
    available_quantity: i32,
}

/// Pure transition rules. Rejection is all-or-nothing; the returned counters
/// always satisfy the invariant set (all non-negative, reserved <= stock).
fn transition(record: &inventory_record::Model, action: &StockAction) -> Result<Counters, ServiceError> {
    let q = action.quantity;
    let (s, r, a) = (
        record.quantity_in_stock,
        record.reserved_quantity,
        record.available_quantity,
    );

    let insufficient_stock = || ServiceError::InsufficientStock {
        item_id: record.item_id,
        requested: q,
        quantity_in_stock: s,
        reserved_quantity: r,
        available_quantity: a,
    };
    let insufficient_reservation = || ServiceError::InsufficientReservation {
        item_id: record.item_id,
        requested: q,
        quantity_in_stock: s,
        reserved_quantity: r,
        available_quantity: a,
    };

    let next = match action.action {
        InventoryAction::Purchase | InventoryAction::Return | InventoryAction::AdjustmentIn => {
            Counters {
                quantity_in_stock: s + q,
                reserved_quantity: r,
                available_quantity: a + q,
            }
        }
        InventoryAction::Damage | InventoryAction::TransferOut => {
            // Removing more than is unreserved would either drive the stock
            // counter negative or strand reservations without stock.
            if s - q < 0 || a - q < 0 {
                return Err(insufficient_stock());
            }
            Counters {
                quantity_in_stock: s - q,
                reserved_quantity: r,
                available_quantity: a - q,
            }
        }
        InventoryAction::Sale => {
            if r < q {
                return Err(insufficient_reservation());
            }
            Counters {
                quantity_in_stock: s - q,
                reserved_quantity: r - q,
                available_quantity: a,
            }
        }
        InventoryAction::Reserve => {
            if a < q {
                return Err(insufficient_stock());
            }
            Counters {
                quantity_in_stock: s,
                reserved_quantity: r + q,
                available_quantity: a - q,
            }
        }
        InventoryAction::Release => {
            if r < q {
                return Err(insufficient_reservation());
            }
            Counters {
                quantity_in_stock: s,
                reserved_quantity: r - q,
                available_quantity: a + q,
            }
        }
    };

    debug_assert!(next.quantity_in_stock >= 0);
    debug_assert!(next.reserved_quantity >= 0);
    debug_assert!(next.available_quantity >= 0);
    debug_assert!(next.reserved_quantity <= next.quantity_in_stock);
    Ok(next)
}
