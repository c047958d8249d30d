//! Order store.
//!
//! The fulfillment handler only ever reads an order and advances its status
//! with a compare-and-set, so those primitives are free functions generic
//! over the connection: they run inside whatever transaction the caller
//! holds. `OrderService` wraps the administrative surface (creation for
//! seeding/checkout, lookups).

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_line::{self, Entity as OrderLineEntity};
use crate::errors::ServiceError;

/// Result of a CAS status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Applied,
    /// Another writer changed the status first; the caller lost the race.
    Conflict,
}

pub async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<order::Model>, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn load_order_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<order_line::Model>, ServiceError> {
    OrderLineEntity::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Atomically advances `status` from `from` to `to`. Zero rows affected
/// means the order was not in `from` anymore, so two status writers can
/// never both win.
pub async fn transition_status<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<StatusTransition, ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(to.as_str()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .col_expr(
            order::Column::Version,
            Expr::col(order::Column::Version).add(1),
        )
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(from.as_str()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Ok(StatusTransition::Conflict);
    }
    Ok(StatusTransition::Applied)
}

/// Administrative/seeding surface over orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a `pending` order with its lines in one transaction.
    #[instrument(skip(self, lines), fields(customer_id = %customer_id, line_count = lines.len()))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        lines: Vec<(Uuid, i32)>,
    ) -> Result<order::Model, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one line".to_string(),
            ));
        }
        if let Some((item_id, quantity)) = lines.iter().find(|(_, q)| *q <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "Line quantity must be a positive integer, got {} for item {}",
                quantity, item_id
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(0),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        for (item_id, quantity) in lines {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                item_id: Set(item_id),
                quantity: Set(quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(order_id = %order_id, "Created order");
        Ok(order)
    }

    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(order::Model, Vec<order_line::Model>)>, ServiceError> {
        let Some(order) = load_order(&*self.db, order_id).await? else {
            return Ok(None);
        };
        let lines = load_order_lines(&*self.db, order_id).await?;
        Ok(Some((order, lines)))
    }
}
