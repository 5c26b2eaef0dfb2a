//! End-to-end: socket adapters against a real hub over TCP
//!
//! Two clients connect, one writes, both converge - including the
//! writer, which observes its own echo through the hub broadcast.

use oderwall_hub::{Config, HubServer, HubState};
use oderwall_store::{OrderStore, SocketAdapter, StoreError, SyncAdapter};
use shared::order::{lifecycle, CartItem, Order, OrderStatus, PathUpdates, PaymentMethod};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct TestHub {
    addr: String,
    server: Arc<HubServer>,
    _data_dir: tempfile::TempDir,
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.server.shutdown_token().cancel();
    }
}

async fn start_hub() -> TestHub {
    let data_dir = tempfile::tempdir().unwrap();
    // Random high port to avoid conflicts between parallel tests
    let port = 10000 + (rand::random::<u16>() % 20000);
    let addr = format!("127.0.0.1:{}", port);

    let config = Config::with_overrides(data_dir.path().to_str().unwrap(), addr.clone());
    let state = Arc::new(HubState::load(data_dir.path(), config.history_limit).unwrap());
    let server = Arc::new(HubServer::new(config, state));

    let runner = server.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            eprintln!("hub exited: {}", e);
        }
    });

    // Give the listener a moment to bind
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestHub {
        addr,
        server,
        _data_dir: data_dir,
    }
}

fn stall_cart() -> Vec<CartItem> {
    vec![
        CartItem::new("Veg Atho", 3, 110.0),
        CartItem::new("Water Bottle", 1, 20.0),
    ]
}

async fn await_snapshot(
    rx: &mut broadcast::Receiver<Vec<Order>>,
    accept: impl Fn(&[Order]) -> bool,
) -> Vec<Order> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(snapshot) = rx.recv().await
                && accept(&snapshot)
            {
                return snapshot;
            }
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

#[tokio::test]
async fn test_two_clients_converge_with_writer_echo() {
    let hub = start_hub().await;

    let cashier = OrderStore::new(Arc::new(
        SocketAdapter::connect(&hub.addr, "cashier").await.unwrap(),
    ));
    let kitchen = OrderStore::new(Arc::new(
        SocketAdapter::connect(&hub.addr, "kitchen").await.unwrap(),
    ));

    let mut cashier_rx = cashier.subscribe();
    let mut kitchen_rx = kitchen.subscribe();

    let order = cashier
        .checkout(&stall_cart(), PaymentMethod::Gpay)
        .await
        .unwrap();

    // The kitchen converges on the hub broadcast...
    let seen = await_snapshot(&mut kitchen_rx, |s| s.iter().any(|o| o.id == order.id)).await;
    assert_eq!(seen[0].total, 350.0);

    // ...and so does the writer, through its own echo
    await_snapshot(&mut cashier_rx, |s| s.iter().any(|o| o.id == order.id)).await;

    // A fresh client starting later gets the list on connect
    let latecomer = SocketAdapter::connect(&hub.addr, "customer").await.unwrap();
    let listed = latecomer.load_all().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, order.id);
}

#[tokio::test]
async fn test_full_lifecycle_over_hub() {
    let hub = start_hub().await;

    let cashier = OrderStore::new(Arc::new(
        SocketAdapter::connect(&hub.addr, "cashier").await.unwrap(),
    ));
    let kitchen = OrderStore::new(Arc::new(
        SocketAdapter::connect(&hub.addr, "kitchen").await.unwrap(),
    ));
    let mut kitchen_rx = kitchen.subscribe();

    let order = cashier
        .checkout(&stall_cart(), PaymentMethod::Cash)
        .await
        .unwrap();
    cashier.send_to_kitchen(order.id).await.unwrap();

    await_snapshot(&mut kitchen_rx, |s| {
        s.iter().any(|o| o.id == order.id && o.status == OrderStatus::Cooking)
    })
    .await;

    // Kitchen dispatches both lines; the cashier converges on ready
    let mut cashier_rx = cashier.subscribe();
    kitchen.dispatch_item(order.id, 0).await.unwrap();
    kitchen.dispatch_item(order.id, 1).await.unwrap();

    await_snapshot(&mut cashier_rx, |s| {
        s.iter().any(|o| o.id == order.id && o.status == OrderStatus::Ready)
    })
    .await;

    // Cashier completes; the archived record reaches history, the live
    // set empties on both sides
    let archived = cashier.complete(order.id).await.unwrap();
    assert!(archived.completed_at.is_some());

    await_snapshot(&mut kitchen_rx, |s| s.is_empty()).await;

    let history = kitchen.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, order.id);
}

#[tokio::test]
async fn test_hub_enforces_complete_precondition() {
    let hub = start_hub().await;
    let adapter = SocketAdapter::connect(&hub.addr, "rogue").await.unwrap();

    let ids = lifecycle::OrderIds::new();
    let order = lifecycle::checkout(&ids, &stall_cart(), PaymentMethod::Cash).unwrap();
    let cooking = lifecycle::send_to_kitchen(&order).unwrap();
    adapter.store(&cooking).await.unwrap();

    // The client lies about local state; the hub still holds a cooking
    // order and refuses to complete it
    let mut forged = cooking.clone();
    forged.status = OrderStatus::Completed;
    let result = adapter.complete(&forged).await;
    assert!(matches!(result, Err(StoreError::Rejected(_))));

    // The order is still live on the hub
    assert_eq!(adapter.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_patch_rides_update_order() {
    let hub = start_hub().await;

    let writer = SocketAdapter::connect(&hub.addr, "kitchen").await.unwrap();
    let watcher = SocketAdapter::connect(&hub.addr, "customer").await.unwrap();
    let mut watcher_rx = watcher.subscribe();

    let ids = lifecycle::OrderIds::new();
    let order = lifecycle::checkout(&ids, &stall_cart(), PaymentMethod::Gpay).unwrap();
    let cooking = lifecycle::send_to_kitchen(&order).unwrap();
    writer.store(&cooking).await.unwrap();

    let mut updates = PathUpdates::new();
    updates.insert("items/0/status".to_string(), serde_json::json!("ready"));
    writer.patch(cooking.id, &updates).await.unwrap();

    let seen = await_snapshot(&mut watcher_rx, |s| {
        s.iter()
            .any(|o| o.id == cooking.id && o.items[0].status == shared::order::ItemStatus::Ready)
    })
    .await;
    // Partial write: the sibling line is untouched
    assert_eq!(seen[0].items[1].status, shared::order::ItemStatus::Cooking);

    // A patch against an unknown order is rejected for the writer only
    let missing = watcher.patch(424242, &updates).await;
    assert!(matches!(missing, Err(StoreError::OrderNotFound(424242))));
}
