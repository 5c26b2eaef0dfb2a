//! Synchronization adapters - pluggable transports over the live store
//!
//! ```text
//!         ┌─────────────────────┐
//!         │  SyncAdapter Trait  │  ◄── pluggable interface
//!         └──────────┬──────────┘
//!                    │
//!     ┌──────────┬───┴──────┬─────────────┐
//!     ▼          ▼          ▼             ▼
//! LocalBroadcast Poll     Socket      KeyedStore
//! (storage+event)(interval)(hub TCP)  (redb paths)
//! ```
//!
//! All four satisfy the same contract with different propagation
//! semantics: subscribers eventually receive a snapshot reflecting
//! every committed write, but whether the writer observes its own echo
//! differs per transport (the local-broadcast adapter suppresses it,
//! the hub and the keyed store deliver it). Callers therefore treat
//! every snapshot as a wholesale replacement, which makes duplicate
//! delivery harmless.
//!
//! Concurrent writers race last-write-wins; there is no merge and no
//! version check. Lost updates under simultaneous same-order writes are
//! an accepted trade-off for the few-operators usage profile.

mod keyed;
mod local;
mod poll;
mod socket;

pub use keyed::KeyedStoreAdapter;
pub use local::{LocalBroadcastAdapter, SharedStorage, ORDERS_KEY};
pub use poll::PollAdapter;
pub use socket::SocketAdapter;

use crate::error::StoreResult;
use async_trait::async_trait;
use shared::order::{apply_updates, Order, OrderId, PathUpdates};
use tokio::sync::broadcast;

/// Capacity of per-adapter snapshot channels
pub(crate) const ORDERS_CHANNEL_CAPACITY: usize = 64;

/// Transport contract every adapter satisfies
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Read the full live order set from the medium
    async fn load_all(&self) -> StoreResult<Vec<Order>>;

    /// Write one full order snapshot (creation or replacement)
    async fn store(&self, order: &Order) -> StoreResult<()>;

    /// Write only specific field paths of one order
    ///
    /// Adapters without partial-write support fall back to
    /// read-modify-store, tolerating the larger race window that
    /// implies.
    async fn patch(&self, order_id: OrderId, updates: &PathUpdates) -> StoreResult<()> {
        let orders = self.load_all().await?;
        let current = orders
            .into_iter()
            .find(|o| o.id == order_id)
            .ok_or(crate::error::StoreError::OrderNotFound(order_id))?;
        let updated = apply_updates(&current, updates)?;
        self.store(&updated).await
    }

    /// Delete an order from the live set
    async fn remove(&self, order_id: OrderId) -> StoreResult<()>;

    /// Archive a completed order and remove it from the live set
    ///
    /// Append-then-remove, in that order: an archive failure must leave
    /// the order live and visible. Returns the archived record (with
    /// `completedAt` stamped).
    async fn complete(&self, order: &Order) -> StoreResult<Order>;

    /// Archived orders, newest first
    async fn history(&self, limit: usize) -> StoreResult<Vec<Order>>;

    /// Subscribe to full-snapshot change notifications
    fn subscribe(&self) -> broadcast::Receiver<Vec<Order>>;

    /// Whether the medium pushes changes on its own
    ///
    /// When false, the owning store runs a polling loop instead of
    /// waiting for notifications that will never come.
    fn supports_push(&self) -> bool {
        true
    }
}

/// Replace an order in place, or append it when new
pub(crate) fn upsert_into(orders: &mut Vec<Order>, order: &Order) {
    match orders.iter_mut().find(|o| o.id == order.id) {
        Some(slot) => *slot = order.clone(),
        None => orders.push(order.clone()),
    }
}
