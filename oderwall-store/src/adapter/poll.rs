//! Poll adapter - resilience fallback when change events are unreliable
//!
//! Shares the same storage as the local-broadcast adapter but wires no
//! events at all: `supports_push()` is false, which makes the owning
//! store run its fixed-interval polling loop and re-invoke subscribers
//! even absent an explicit change signal. The adapter itself only
//! reads and writes.

use super::{ORDERS_CHANNEL_CAPACITY, SyncAdapter, upsert_into};
use crate::archive::Archive;
use crate::error::StoreResult;
use crate::adapter::local::SharedStorage;
use async_trait::async_trait;
use shared::order::{Order, OrderId};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct PollAdapter {
    storage: Arc<SharedStorage>,
    archive: Arc<dyn Archive>,
    origin: Uuid,
    orders_tx: broadcast::Sender<Vec<Order>>,
}

impl PollAdapter {
    pub fn new(storage: Arc<SharedStorage>, archive: Arc<dyn Archive>) -> Self {
        let (orders_tx, _) = broadcast::channel(ORDERS_CHANNEL_CAPACITY);
        Self {
            storage,
            archive,
            origin: Uuid::new_v4(),
            orders_tx,
        }
    }
}

#[async_trait]
impl SyncAdapter for PollAdapter {
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

    /// Nothing is ever sent here; liveness comes from the store's poll loop
    fn subscribe(&self) -> broadcast::Receiver<Vec<Order>> {
        self.orders_tx.subscribe()
    }

    fn supports_push(&self) -> bool {
        false
    }
}
