//! SeaORM entity definitions for the fulfillment core.

pub mod inventory_log_entry;
pub mod inventory_record;
pub mod order;
pub mod order_line;
pub mod queue_job;
