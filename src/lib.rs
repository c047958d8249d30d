//! Stockpile fulfillment core.
//!
//! Inventory ledger with an append-only audit trail, a durable job queue,
//! and the worker pool that finalizes orders and keeps the search index in
//! sync. Everything request/response-shaped (HTTP, auth, catalog CRUD)
//! lives in the surrounding services; this crate owns the parts where
//! concurrency correctness and cross-entity consistency matter.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod queue;
pub mod services;
pub mod workers;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub queue: Arc<dyn queue::JobQueue>,
    pub inventory_service: services::inventory::InventoryService,
    pub order_service: services::orders::OrderService,
    pub job_dispatch: services::job_dispatch::JobDispatchService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        queue: Arc<dyn queue::JobQueue>,
    ) -> Self {
        let inventory_service =
            services::inventory::InventoryService::new(db.clone(), event_sender.clone());
        let order_service = services::orders::OrderService::new(db.clone());
        let job_dispatch = services::job_dispatch::JobDispatchService::new(queue.clone());
        Self {
            db,
            config,
            event_sender,
            queue,
            inventory_service,
            order_service,
            job_dispatch,
        }
    }
}
