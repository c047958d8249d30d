//! Order fulfillment: converts reservations into permanent deductions once
//! an order is confirmed.
//!
//! The whole confirmation is one transaction: status CAS plus a `Sale` per
//! line. Any line failure rolls everything back and the order stays
//! `pending` for redelivery. Redelivery is safe because a non-`pending`
//! order is a no-op.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::inventory_log_entry::InventoryAction;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::queue::{Job, JobPayload};
use crate::services::inventory::{self, StockAction};
use crate::services::orders::{self, StatusTransition};
use crate::workers::{JobHandler, JobOutcome};

enum Confirmation {
    Confirmed(Vec<Event>),
    Skipped(String),
}

#[derive(Clone)]
pub struct OrderFulfillmentHandler {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderFulfillmentHandler {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Confirms one order. Exposed for tests and direct (non-queued)
    /// invocation; the queue path goes through `JobHandler`.
    #[instrument(skip(self))]
    pub async fn process_order(&self, order_id: Uuid) -> Result<JobOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        match confirm_in(&txn, order_id).await {
            Ok(Confirmation::Confirmed(events)) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                for event in events {
                    if let Err(e) = self.event_sender.send(event).await {
                        warn!(order_id = %order_id, "Failed to emit event: {}", e);
                    }
                }
                info!(order_id = %order_id, "Order confirmed");
                Ok(JobOutcome::Completed)
            }
            Ok(Confirmation::Skipped(reason)) => {
                let _ = txn.rollback().await;
                Ok(JobOutcome::Discarded(reason))
            }
            Err(e) => {
                // No partial confirmation: status change and every line
                // deduction roll back together.
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }
}

async fn confirm_in(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<Confirmation, ServiceError> {
    let Some(order) = orders::load_order(txn, order_id).await? else {
        // Not an error: the order may have been legitimately cancelled and
        // purged upstream, or the job references stale seed data.
        warn!(order_id = %order_id, "Fulfillment job for unknown order, discarding");
        return Ok(Confirmation::Skipped(format!(
            "order {} not found",
            order_id
        )));
    };

    match OrderStatus::from_str(&order.status) {
        Some(OrderStatus::Pending) => {}
        _ => {
            // Already confirmed (redelivery) or cancelled: idempotent no-op.
            return Ok(Confirmation::Skipped(format!(
                "order {} is '{}', nothing to fulfill",
                order_id, order.status
            )));
        }
    }

    if transition_status_pending_confirmed(txn, order_id).await? == StatusTransition::Conflict {
        return Ok(Confirmation::Skipped(format!(
            "order {} status changed concurrently",
            order_id
        )));
    }

    let lines = orders::load_order_lines(txn, order_id).await?;
    let mut events = Vec::with_capacity(lines.len() + 1);
    for line in &lines {
        let action = StockAction::new(line.item_id, InventoryAction::Sale, line.quantity)
            .with_reason(format!("order {} confirmed", order_id))
            .with_order_line(line.id);
        inventory::validate(&action)?;
        let (_, event) = inventory::apply_action_in(txn, &action).await?;
        events.push(event);
    }

    events.push(Event::OrderConfirmed(order_id));
    Ok(Confirmation::Confirmed(events))
}

async fn transition_status_pending_confirmed(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<StatusTransition, ServiceError> {
    orders::transition_status(txn, order_id, OrderStatus::Pending, OrderStatus::Confirmed).await
}

#[async_trait]
impl JobHandler for OrderFulfillmentHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, ServiceError> {
        let JobPayload::ProcessOrder { order_id } = &job.payload else {
            return Err(ServiceError::ValidationError(format!(
                "process-order handler received a '{}' payload",
                job.kind.as_str()
            )));
        };
        self.process_order(*order_id).await
    }
}
