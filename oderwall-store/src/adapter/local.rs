//! Local-broadcast adapter - shared storage plus same-device change events
//!
//! Models the simplest deployment: every view runs on one device and
//! shares a single storage key holding the JSON-serialized order array.
//! A write persists the full array and raises a change event tagged
//! with the writer's origin; the event reaches every *other* adapter
//! instance on the storage, never the writer's own subscribers -
//! callers re-render locally after writing, exactly like the original
//! views did.

use super::{ORDERS_CHANNEL_CAPACITY, SyncAdapter, upsert_into};
use crate::archive::Archive;
use crate::error::{StoreResult, transport_err};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::order::{Order, OrderId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// The shared key all views watch
pub const ORDERS_KEY: &str = "oderwall_orders";

/// Capacity of the storage event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change event raised on every committed write
#[derive(Debug, Clone, Copy)]
pub struct StorageEvent {
    /// Which adapter instance wrote (writers skip their own events)
    pub origin: Uuid,
}

/// Shared storage: one key, one JSON file, one event channel
///
/// Multiple adapter instances (one per view) hold the same
/// `Arc<SharedStorage>`; mutations are serialized under one lock so a
/// read-modify-write cannot interleave within the process.
pub struct SharedStorage {
    path: PathBuf,
    orders: Mutex<Vec<Order>>,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl SharedStorage {
    /// Open the storage in the given directory, loading any prior state
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Arc<Self>> {
        let path = dir.as_ref().join(format!("{ORDERS_KEY}.json"));
        let orders = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(transport_err)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            path,
            orders: Mutex::new(orders),
            event_tx,
        }))
    }

    /// Current full order array
    pub fn read(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    /// Mutate the array under the storage lock, persist, raise the event
    ///
    /// The in-memory mutation is not rolled back when the file write
    /// fails; the view keeps its optimistic state and the failure is
    /// reported for the operator to retry.
    pub fn write_with(
        &self,
        origin: Uuid,
        mutate: impl FnOnce(&mut Vec<Order>),
    ) -> StoreResult<()> {
        {
            let mut orders = self.orders.lock();
            mutate(&mut orders);
            let json = serde_json::to_vec_pretty(&*orders)?;
            std::fs::write(&self.path, json).map_err(transport_err)?;
        }
        let _ = self.event_tx.send(StorageEvent { origin });
        Ok(())
    }

    /// Listen for change events (all origins; filtering is the caller's)
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

/// Adapter over [`SharedStorage`] with event-driven propagation
pub struct LocalBroadcastAdapter {
    storage: Arc<SharedStorage>,
    archive: Arc<dyn Archive>,
    origin: Uuid,
    orders_tx: broadcast::Sender<Vec<Order>>,
    listen_task: tokio::task::JoinHandle<()>,
}

impl LocalBroadcastAdapter {
    pub fn new(storage: Arc<SharedStorage>, archive: Arc<dyn Archive>) -> Self {
        let origin = Uuid::new_v4();
        let (orders_tx, _) = broadcast::channel(ORDERS_CHANNEL_CAPACITY);

        let mut events = storage.subscribe();
        let tx = orders_tx.clone();
        let shared = storage.clone();
        let listen_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        // A view's own writes do not trigger its own subscriber
                        if event.origin == origin {
                            continue;
                        }
                        let _ = tx.send(shared.read());
                    }
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        tracing::warn!(dropped, "storage events lagged, resyncing");
                        let _ = tx.send(shared.read());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            storage,
            archive,
            origin,
            orders_tx,
            listen_task,
        }
    }
}

impl Drop for LocalBroadcastAdapter {
    fn drop(&mut self) {
        self.listen_task.abort();
    }
}

#[async_trait]
impl SyncAdapter for LocalBroadcastAdapter {
    async fn load_all(&self) -> StoreResult<Vec<Order>> {
        Ok(self.storage.read())
    }

    async fn store(&self, order: &Order) -> StoreResult<()> {
        self.storage
            .write_with(self.origin, |orders| upsert_into(orders, order))
    }

    async fn remove(&self, order_id: OrderId) -> StoreResult<()> {
        self.storage
            .write_with(self.origin, |orders| orders.retain(|o| o.id != order_id))
    }

    async fn complete(&self, order: &Order) -> StoreResult<Order> {
        let archived = self.archive.append(order).await?;
        self.remove(order.id).await?;
        Ok(archived)
    }

    async fn history(&self, limit: usize) -> StoreResult<Vec<Order>> {
        self.archive.list(limit).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Order>> {
        self.orders_tx.subscribe()
    }
}
