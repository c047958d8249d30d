use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::info;

use stockpile_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Durable queue shared by producers and workers
    let queue: Arc<dyn api::queue::JobQueue> = Arc::new(api::queue::SqlJobQueue::new(
        db_arc.clone(),
        cfg.retry_policy(),
        event_sender.clone(),
    ));

    let state = api::AppState::new(db_arc.clone(), cfg.clone(), event_sender.clone(), queue.clone());

    // Job handlers
    let fulfillment = Arc::new(api::services::fulfillment::OrderFulfillmentHandler::new(
        db_arc.clone(),
        event_sender.clone(),
    ));
    let search_sync = Arc::new(api::services::search_sync::SearchSyncHandler::new(
        db_arc.clone(),
        Arc::new(api::services::search_sync::LoggingSearchIndexClient),
    ));

    let mut pool = api::workers::WorkerPool::new(
        queue.clone(),
        cfg.worker.concurrency,
        Duration::from_millis(cfg.worker.poll_interval_ms),
        Duration::from_secs(cfg.worker.handler_timeout_secs),
    );
    pool.register(api::queue::JobKind::ProcessOrder, fulfillment);
    pool.register(api::queue::JobKind::SyncItem, search_sync.clone());
    pool.register(api::queue::JobKind::RebuildIndex, search_sync);
    let pool_handle = pool.start();

    info!(
        environment = %state.config.environment,
        concurrency = state.config.worker.concurrency,
        "stockpile worker started"
    );

    signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers");
    pool_handle.stop().await;

    Ok(())
}
