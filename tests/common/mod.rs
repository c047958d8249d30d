//! Shared test fixtures: an isolated in-memory database per test and an
//! event channel whose receiver is kept alive by the caller.

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

use stockpile_api::db::{self, DbConfig};
use stockpile_api::events::{Event, EventSender};

/// One-connection SQLite pool: `sqlite::memory:` gives every pooled
/// connection its own database, so the pool must stay at a single
/// connection for migrations and queries to agree.
#[allow(dead_code)]
pub async fn setup_test_db() -> Arc<DatabaseConnection> {
    let cfg = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&cfg)
        .await
        .expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(pool)
}

#[allow(dead_code)]
pub fn event_channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(256);
    (EventSender::new(tx), rx)
}
