mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::time::sleep;
use uuid::Uuid;

use stockpile_api::entities::inventory_log_entry::InventoryAction;
use stockpile_api::entities::order::OrderStatus;
use stockpile_api::errors::ServiceError;
use stockpile_api::events::EventSender;
use stockpile_api::queue::{JobKind, JobQueue, RetryPolicy, SqlJobQueue};
use stockpile_api::services::audit;
use stockpile_api::services::fulfillment::OrderFulfillmentHandler;
use stockpile_api::services::inventory::{InventoryService, StockAction};
use stockpile_api::services::job_dispatch::JobDispatchService;
use stockpile_api::services::orders::OrderService;
use stockpile_api::workers::{JobOutcome, WorkerPool};

struct Fixture {
    db: Arc<sea_orm::DatabaseConnection>,
    inventory: InventoryService,
    orders: OrderService,
    handler: OrderFulfillmentHandler,
    sender: EventSender,
}

async fn fixture() -> Fixture {
    let db = common::setup_test_db().await;
    let (sender, rx) = common::event_channel();
    tokio::spawn(stockpile_api::events::process_events(rx));
    Fixture {
        inventory: InventoryService::new(db.clone(), sender.clone()),
        orders: OrderService::new(db.clone()),
        handler: OrderFulfillmentHandler::new(db.clone(), sender.clone()),
        sender,
        db,
    }
}

/// Seeds an item the way the checkout path would: stock received, then the
/// ordered quantity reserved.
async fn seed_item(fix: &Fixture, stock: i32, reserved: i32) -> Uuid {
    let item_id = Uuid::new_v4();
    fix.inventory
        .apply_action(StockAction::new(item_id, InventoryAction::Purchase, stock).with_sku("SKU-F"))
        .await
        .expect("seed purchase");
    if reserved > 0 {
        fix.inventory
            .apply_action(StockAction::new(item_id, InventoryAction::Reserve, reserved))
            .await
            .expect("seed reserve");
    }
    item_id
}

#[tokio::test]
async fn confirming_an_order_deducts_reserved_stock() {
    let fix = fixture().await;
    let item_id = seed_item(&fix, 10, 2).await;
    let order = fix
        .orders
        .create_order(Uuid::new_v4(), vec![(item_id, 2)])
        .await
        .unwrap();

    let outcome = fix.handler.process_order(order.id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let (order, lines) = fix.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed.as_str());

    let view = fix.inventory.get_inventory(item_id).await.unwrap();
    assert_eq!(
        (view.quantity_in_stock, view.reserved_quantity, view.available_quantity),
        (8, 0, 8)
    );

    // The sale entry is linked back to the order line.
    let (entries, _) = audit::list_for_item(&fix.db, item_id, 1, 10).await.unwrap();
    let sale = entries.iter().find(|e| e.action == "sale").unwrap();
    assert_eq!(sale.order_line_id, Some(lines[0].id));
    assert_eq!(sale.quantity_change, -2);
}

#[tokio::test]
async fn redelivering_a_confirmed_order_changes_nothing() {
    let fix = fixture().await;
    let item_id = seed_item(&fix, 10, 2).await;
    let order = fix
        .orders
        .create_order(Uuid::new_v4(), vec![(item_id, 2)])
        .await
        .unwrap();

    assert_eq!(
        fix.handler.process_order(order.id).await.unwrap(),
        JobOutcome::Completed
    );
    let (_, total_before) = audit::list_for_item(&fix.db, item_id, 1, 50).await.unwrap();

    // Simulated redelivery of the same job.
    let outcome = fix.handler.process_order(order.id).await.unwrap();
    assert_matches!(outcome, JobOutcome::Discarded(_));

    let view = fix.inventory.get_inventory(item_id).await.unwrap();
    assert_eq!(
        (view.quantity_in_stock, view.reserved_quantity, view.available_quantity),
        (8, 0, 8)
    );
    let (_, total_after) = audit::list_for_item(&fix.db, item_id, 1, 50).await.unwrap();
    assert_eq!(total_before, total_after);
}

#[tokio::test]
async fn unknown_order_is_discarded_not_retried() {
    let fix = fixture().await;
    let outcome = fix.handler.process_order(Uuid::new_v4()).await.unwrap();
    assert_matches!(outcome, JobOutcome::Discarded(_));
}

#[tokio::test]
async fn cancelled_order_is_a_no_op() {
    let fix = fixture().await;
    let item_id = seed_item(&fix, 5, 1).await;
    let order = fix
        .orders
        .create_order(Uuid::new_v4(), vec![(item_id, 1)])
        .await
        .unwrap();

    // Another writer cancels before the fulfillment job runs.
    stockpile_api::services::orders::transition_status(
        &*fix.db,
        order.id,
        OrderStatus::Pending,
        OrderStatus::Cancelled,
    )
    .await
    .unwrap();

    let outcome = fix.handler.process_order(order.id).await.unwrap();
    assert_matches!(outcome, JobOutcome::Discarded(_));

    let view = fix.inventory.get_inventory(item_id).await.unwrap();
    assert_eq!(view.reserved_quantity, 1);
}

#[tokio::test]
async fn unfulfillable_line_rolls_back_the_whole_order() {
    let fix = fixture().await;
    let item_a = seed_item(&fix, 5, 1).await;
    let item_b = seed_item(&fix, 5, 0).await; // nothing reserved: line must fail
    let order = fix
        .orders
        .create_order(Uuid::new_v4(), vec![(item_a, 1), (item_b, 1)])
        .await
        .unwrap();

    let err = fix.handler.process_order(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientReservation { .. });

    // Order stays pending and is eligible for redelivery.
    let (order, _) = fix.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending.as_str());

    // Neither item's counters moved, and no sale entries were written.
    let view_a = fix.inventory.get_inventory(item_a).await.unwrap();
    assert_eq!(
        (view_a.quantity_in_stock, view_a.reserved_quantity, view_a.available_quantity),
        (5, 1, 4)
    );
    let view_b = fix.inventory.get_inventory(item_b).await.unwrap();
    assert_eq!(
        (view_b.quantity_in_stock, view_b.reserved_quantity, view_b.available_quantity),
        (5, 0, 5)
    );
    for item in [item_a, item_b] {
        let (entries, _) = audit::list_for_item(&fix.db, item, 1, 50).await.unwrap();
        assert!(entries.iter().all(|e| e.action != "sale"));
    }
}

#[tokio::test]
async fn end_to_end_through_queue_and_worker_pool() {
    let fix = fixture().await;
    let item_id = seed_item(&fix, 10, 3).await;
    let order = fix
        .orders
        .create_order(Uuid::new_v4(), vec![(item_id, 3)])
        .await
        .unwrap();

    let queue: Arc<dyn JobQueue> = Arc::new(SqlJobQueue::new(
        fix.db.clone(),
        RetryPolicy::default(),
        fix.sender.clone(),
    ));
    let dispatch = JobDispatchService::new(queue.clone());
    let job_id = dispatch.enqueue_order_fulfillment(order.id).await.unwrap();
    assert_ne!(job_id, Uuid::nil());

    let mut pool = WorkerPool::new(
        queue.clone(),
        2,
        Duration::from_millis(20),
        Duration::from_secs(5),
    );
    pool.register(
        JobKind::ProcessOrder,
        Arc::new(OrderFulfillmentHandler::new(
            fix.db.clone(),
            fix.sender.clone(),
        )),
    );
    let handle = pool.start();

    let mut confirmed = false;
    for _ in 0..200 {
        let (order, _) = fix.orders.get_order(order.id).await.unwrap().unwrap();
        if order.status == OrderStatus::Confirmed.as_str() {
            confirmed = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    handle.stop().await;

    assert!(confirmed, "order should have been confirmed by the pool");
    let view = fix.inventory.get_inventory(item_id).await.unwrap();
    assert_eq!(
        (view.quantity_in_stock, view.reserved_quantity, view.available_quantity),
        (7, 0, 7)
    );
}
