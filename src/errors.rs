use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

use crate::queue::QueueError;

/// Service-level error taxonomy.
///
/// Business-rule variants carry the counters that were current when the
/// operation was rejected so an operator can decide whether to force an
/// adjustment.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No inventory record for item {item_id} and no sku supplied to create one")]
    MissingSku { item_id: Uuid },

    #[error("Insufficient stock for item {item_id}: requested {requested}, in stock {quantity_in_stock} (reserved {reserved_quantity}, available {available_quantity})")]
    InsufficientStock {
        item_id: Uuid,
        requested: i32,
        quantity_in_stock: i32,
        reserved_quantity: i32,
        available_quantity: i32,
    },

    #[error("Insufficient reservation for item {item_id}: requested {requested}, reserved {reserved_quantity} (in stock {quantity_in_stock}, available {available_quantity})")]
    InsufficientReservation {
        item_id: Uuid,
        requested: i32,
        quantity_in_stock: i32,
        reserved_quantity: i32,
        available_quantity: i32,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Queue error: {0}")]
    QueueError(
        #[from]
        #[serde(skip)]
        QueueError,
    ),

    #[error("Event dispatch error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Helper to wrap a `DbErr` without going through `From` in closures.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Whether a fulfillment-path failure should be redelivered.
    ///
    /// Validation-class errors can never self-resolve; not-found inside a
    /// handler is terminal (the referent was purged upstream). Everything
    /// else, including business-rule races and transport errors, is retried
    /// up to the dead-letter budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ServiceError::ValidationError(_)
                | ServiceError::MissingSku { .. }
                | ServiceError::NotFound(_)
        )
    }
}
