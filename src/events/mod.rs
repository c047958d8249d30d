//! In-process domain events.
//!
//! Services emit events after their transaction commits; a background
//! consumer (`process_events`) logs them and is the hook point for outbound
//! integrations. Event delivery is best-effort and never gates a commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted by the fulfillment core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A committed ledger mutation, snapshots included.
    InventoryAdjusted {
        item_id: Uuid,
        action: String,
        quantity_change: i32,
        quantity_before: i32,
        quantity_after: i32,
        reserved_before: i32,
        reserved_after: i32,
    },

    /// An order transitioned `pending` -> `confirmed` with all lines deducted.
    OrderConfirmed(Uuid),

    /// A job exhausted its retry budget and was routed to the dead-letter
    /// state. Emitted so the failure is observable rather than silent.
    JobDeadLettered {
        job_id: Uuid,
        kind: String,
        attempts: i32,
        error: String,
        dead_at: DateTime<Utc>,
    },
}

/// Background event consumer. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::InventoryAdjusted {
                item_id,
                action,
                quantity_change,
                quantity_after,
                ..
            } => {
                info!(
                    item_id = %item_id,
                    action = %action,
                    quantity_change = quantity_change,
                    quantity_after = quantity_after,
                    "Inventory adjusted"
                );
            }
            Event::OrderConfirmed(order_id) => {
                info!(order_id = %order_id, "Order confirmed");
            }
            Event::JobDeadLettered {
                job_id,
                kind,
                attempts,
                error,
                ..
            } => {
                warn!(
                    job_id = %job_id,
                    kind = %kind,
                    attempts = attempts,
                    error = %error,
                    "Job moved to dead-letter state"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
