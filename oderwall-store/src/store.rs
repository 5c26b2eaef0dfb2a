//! OrderStore - the authoritative live set as one view sees it
//!
//! # Write path
//!
//! ```text
//! view action
//!     ├─ 1. Load the order from the local cache
//!     ├─ 2. Run the pure lifecycle transition
//!     ├─ 3. Persist through the active adapter
//!     ├─ 4. Apply optimistically to the local cache
//!     └─ 5. Notify local subscribers
//! ```
//!
//! The cache is write-ahead: step 4 happens without waiting for the
//! transport round trip, hiding its latency. Whenever the adapter
//! reports a change (someone else's write, or this view's own echo),
//! the cache is replaced wholesale - the subscription callback's value
//! always wins over optimistic state.
//!
//! For adapters that cannot push (`supports_push() == false`) the store
//! owns a fixed-interval polling loop that re-reads the medium and
//! re-invokes subscribers even absent an explicit change signal.

use crate::adapter::SyncAdapter;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use shared::order::lifecycle::{self, OrderIds};
use shared::order::{CartItem, Order, OrderId, OrderStatus, PathUpdates, PaymentMethod};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the store's subscriber channel
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// Store tuning knobs
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Poll interval for pushless adapters
    pub poll_interval: Duration,
    /// Default page size for history queries
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            history_limit: crate::archive::DEFAULT_HISTORY_LIMIT,
        }
    }
}

pub struct OrderStore {
    adapter: Arc<dyn SyncAdapter>,
    ids: OrderIds,
    live: Arc<RwLock<Vec<Order>>>,
    orders_tx: broadcast::Sender<Vec<Order>>,
    shutdown: CancellationToken,
    config: StoreConfig,
}

impl OrderStore {
    pub fn new(adapter: Arc<dyn SyncAdapter>) -> Arc<Self> {
        Self::with_config(adapter, StoreConfig::default())
    }

    pub fn with_config(adapter: Arc<dyn SyncAdapter>, config: StoreConfig) -> Arc<Self> {
        let (orders_tx, _) = broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let store = Arc::new(Self {
            adapter,
            ids: OrderIds::new(),
            live: Arc::new(RwLock::new(Vec::new())),
            orders_tx,
            shutdown: CancellationToken::new(),
            config,
        });
        store.spawn_sync_tasks();
        store
    }

    /// Wire the reconciliation path: push forwarding or the poll loop
    fn spawn_sync_tasks(&self) {
        let live = self.live.clone();
        let tx = self.orders_tx.clone();
        let token = self.shutdown.clone();

        if self.adapter.supports_push() {
            let mut rx = self.adapter.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        result = rx.recv() => match result {
                            Ok(orders) => {
                                *live.write() = orders.clone();
                                let _ = tx.send(orders);
                            }
                            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                                tracing::warn!(dropped, "adapter notifications lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            });
        } else {
            let adapter = self.adapter.clone();
            let interval = self.config.poll_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => match adapter.load_all().await {
                            Ok(orders) => {
                                *live.write() = orders.clone();
                                // Re-invoke subscribers even absent a change
                                let _ = tx.send(orders);
                            }
                            Err(e) => tracing::warn!(error = %e, "poll failed"),
                        }
                    }
                }
            });
        }
    }

    /// Pull the current state from the adapter once (initial sync)
    pub async fn refresh(&self) -> StoreResult<()> {
        let orders = self.adapter.load_all().await?;
        self.reconcile(orders);
        Ok(())
    }

    fn reconcile(&self, orders: Vec<Order>) {
        *self.live.write() = orders.clone();
        let _ = self.orders_tx.send(orders);
    }

    /// Apply a local write optimistically and notify local subscribers
    fn apply_local(&self, mutate: impl FnOnce(&mut Vec<Order>)) {
        let snapshot = {
            let mut live = self.live.write();
            mutate(&mut live);
            live.clone()
        };
        let _ = self.orders_tx.send(snapshot);
    }

    fn get(&self, order_id: OrderId) -> StoreResult<Order> {
        self.live
            .read()
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    // ========== Raw store surface ==========

    /// Best-known local snapshot; never blocks on the transport
    pub fn get_all(&self) -> Vec<Order> {
        self.live.read().clone()
    }

    /// Full-snapshot change notifications
    ///
    /// Echoes of this view's own writes may be delivered; snapshots
    /// replace state wholesale, so duplicate delivery is idempotent.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Order>> {
        self.orders_tx.subscribe()
    }

    /// Write a full order snapshot (creation or replacement)
    pub async fn upsert(&self, order: Order) -> StoreResult<()> {
        self.adapter.store(&order).await?;
        self.apply_local(|orders| crate::adapter::upsert_into(orders, &order));
        Ok(())
    }

    /// Write only specific field paths of one order
    pub async fn patch(&self, order_id: OrderId, updates: PathUpdates) -> StoreResult<()> {
        self.adapter.patch(order_id, &updates).await?;
        // Mirror the patch onto the cached copy so the local view moves too
        if let Ok(current) = self.get(order_id)
            && let Ok(updated) = shared::order::apply_updates(&current, &updates)
        {
            self.apply_local(|orders| crate::adapter::upsert_into(orders, &updated));
        }
        Ok(())
    }

    /// Delete an order from the live set
    pub async fn remove(&self, order_id: OrderId) -> StoreResult<()> {
        self.adapter.remove(order_id).await?;
        self.apply_local(|orders| orders.retain(|o| o.id != order_id));
        Ok(())
    }

    // ========== Lifecycle operations ==========

    /// Checkout the cart into a new pending order
    pub async fn checkout(
        &self,
        cart: &[CartItem],
        payment_method: PaymentMethod,
    ) -> StoreResult<Order> {
        let order = lifecycle::checkout(&self.ids, cart, payment_method)?;
        tracing::info!(order_id = order.id, total = order.total, "order placed");
        self.upsert(order.clone()).await?;
        Ok(order)
    }

    /// Move a pending order (and all its items) to the kitchen
    pub async fn send_to_kitchen(&self, order_id: OrderId) -> StoreResult<Order> {
        let next = lifecycle::send_to_kitchen(&self.get(order_id)?)?;
        self.upsert(next.clone()).await?;
        Ok(next)
    }

    /// Mark one line item ready; the order rolls up per the ready rule
    pub async fn dispatch_item(&self, order_id: OrderId, item_index: usize) -> StoreResult<Order> {
        let next = lifecycle::dispatch_item(&self.get(order_id)?, item_index)?;
        self.upsert(next.clone()).await?;
        Ok(next)
    }

    /// Mark every item (and the order) ready
    pub async fn dispatch_all(&self, order_id: OrderId) -> StoreResult<Order> {
        let next = lifecycle::dispatch_all(&self.get(order_id)?)?;
        self.upsert(next.clone()).await?;
        Ok(next)
    }

    /// Complete a ready order: archive it, then remove it from the live set
    ///
    /// Append-then-remove, never the reverse. When the archive write
    /// fails the order stays live and visible.
    pub async fn complete(&self, order_id: OrderId) -> StoreResult<Order> {
        let completed = lifecycle::complete(&self.get(order_id)?)?;
        let archived = self.adapter.complete(&completed).await?;
        self.apply_local(|orders| orders.retain(|o| o.id != order_id));
        tracing::info!(order_id, "order completed and archived");
        Ok(archived)
    }

    /// Record change owed back to the customer
    pub async fn attach_pending_change(
        &self,
        order_id: OrderId,
        amount: f64,
    ) -> StoreResult<Order> {
        let next = lifecycle::attach_pending_change(&self.get(order_id)?, amount)?;
        self.upsert(next.clone()).await?;
        Ok(next)
    }

    /// Clear the pending-change flag once the customer has been paid out
    pub async fn clear_pending_change(&self, order_id: OrderId) -> StoreResult<Order> {
        let next = lifecycle::clear_pending_change(&self.get(order_id)?);
        self.upsert(next.clone()).await?;
        Ok(next)
    }

    /// Archived orders, newest first
    pub async fn history(&self, limit: usize) -> StoreResult<Vec<Order>> {
        self.adapter.history(limit).await
    }

    /// History page at the configured default size
    pub async fn recent_history(&self) -> StoreResult<Vec<Order>> {
        self.history(self.config.history_limit).await
    }

    // ========== Derived views ==========

    /// Orders awaiting payment confirmation (cashier + customer screens)
    pub fn pending_orders(&self) -> Vec<Order> {
        self.filtered(|o| o.status == OrderStatus::Pending)
    }

    /// Orders in the kitchen: cooking or ready (cashier + kitchen screens)
    pub fn ongoing_orders(&self) -> Vec<Order> {
        self.filtered(|o| {
            o.status == OrderStatus::Cooking || o.status == OrderStatus::Ready
        })
    }

    /// Fully ready orders awaiting completion
    pub fn ready_orders(&self) -> Vec<Order> {
        self.filtered(|o| o.status == OrderStatus::Ready)
    }

    /// Search by id fragment or item name, as the cashier search box does
    pub fn search(&self, term: &str) -> Vec<Order> {
        self.filtered(|o| o.matches_search(term))
    }

    fn filtered(&self, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
        self.live.read().iter().filter(|o| keep(o)).cloned().collect()
    }

    /// Stop the background sync tasks
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for OrderStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
