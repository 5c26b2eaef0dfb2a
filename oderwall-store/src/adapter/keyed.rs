//! Keyed-store adapter - realtime keyed store with path-level writes
//!
//! Backed by redb: the live set is a table keyed by order id, the
//! archive is a separate durable table in the same database. This is
//! the one transport with genuine partial-path writes - a patch
//! rewrites only the targeted order's row inside a single write
//! transaction, never the whole set - and the one where "complete" is
//! truly atomic: the archive row insert and the live row delete commit
//! together.
//!
//! Subscribers (including the writer) are notified with a fresh full
//! snapshot after every commit.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `live_orders` | `order_id` | JSON-serialized `Order` | Live set |
//! | `archived_orders` | `order_id` | JSON-serialized `Order` | Archive |

use super::{ORDERS_CHANNEL_CAPACITY, SyncAdapter};
use crate::error::{StoreError, StoreResult, transport_err};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::order::{Order, OrderId, OrderStatus, PathUpdates, apply_updates, lifecycle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

const LIVE_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("live_orders");
const ARCHIVE_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("archived_orders");

pub struct KeyedStoreAdapter {
    db: Arc<Database>,
    orders_tx: broadcast::Sender<Vec<Order>>,
}

impl KeyedStoreAdapter {
    /// Open or create the keyed store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path).map_err(transport_err)?;
        Self::init(db)
    }

    /// Open an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(transport_err)?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        let write_txn = db.begin_write().map_err(transport_err)?;
        {
            let _ = write_txn.open_table(LIVE_TABLE).map_err(transport_err)?;
            let _ = write_txn.open_table(ARCHIVE_TABLE).map_err(transport_err)?;
        }
        write_txn.commit().map_err(transport_err)?;

        let (orders_tx, _) = broadcast::channel(ORDERS_CHANNEL_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            orders_tx,
        })
    }

    fn read_live(&self) -> StoreResult<Vec<Order>> {
        let txn = self.db.begin_read().map_err(transport_err)?;
        let table = txn.open_table(LIVE_TABLE).map_err(transport_err)?;

        let mut orders = Vec::new();
        for entry in table.iter().map_err(transport_err)? {
            let (_, value) = entry.map_err(transport_err)?;
            orders.push(serde_json::from_slice::<Order>(value.value())?);
        }
        // Table iteration is keyed ascending; ids are creation-ordered,
        // so this is already cart/checkout order
        Ok(orders)
    }

    /// Echo the committed state to every subscriber, writer included
    fn notify(&self) {
        match self.read_live() {
            Ok(orders) => {
                let _ = self.orders_tx.send(orders);
            }
            Err(e) => tracing::warn!(error = %e, "failed to read snapshot for notification"),
        }
    }
}

#[async_trait]
impl SyncAdapter for KeyedStoreAdapter {
    async fn load_all(&self) -> StoreResult<Vec<Order>> {
        self.read_live()
    }

    async fn store(&self, order: &Order) -> StoreResult<()> {
        let bytes = serde_json::to_vec(order)?;
        let txn = self.db.begin_write().map_err(transport_err)?;
        {
            let mut table = txn.open_table(LIVE_TABLE).map_err(transport_err)?;
            table
                .insert(order.id, bytes.as_slice())
                .map_err(transport_err)?;
        }
        txn.commit().map_err(transport_err)?;

        self.notify();
        Ok(())
    }

    async fn patch(&self, order_id: OrderId, updates: &PathUpdates) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(transport_err)?;
        {
            let mut table = txn.open_table(LIVE_TABLE).map_err(transport_err)?;

            let current: Order = match table.get(order_id).map_err(transport_err)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(StoreError::OrderNotFound(order_id)),
            };

            let updated = apply_updates(&current, updates)?;
            let bytes = serde_json::to_vec(&updated)?;
            table
                .insert(order_id, bytes.as_slice())
                .map_err(transport_err)?;
        }
        txn.commit().map_err(transport_err)?;

        self.notify();
        Ok(())
    }

    async fn remove(&self, order_id: OrderId) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(transport_err)?;
        {
            let mut table = txn.open_table(LIVE_TABLE).map_err(transport_err)?;
            table.remove(order_id).map_err(transport_err)?;
        }
        txn.commit().map_err(transport_err)?;

        self.notify();
        Ok(())
    }

    async fn complete(&self, order: &Order) -> StoreResult<Order> {
        if order.status != OrderStatus::Completed {
            return Err(StoreError::ArchiveWrite(format!(
                "order {} is {:?}, only completed orders are archived",
                order.id, order.status
            )));
        }

        let mut record = order.clone();
        if record.completed_at.is_none() {
            record.completed_at = Some(lifecycle::now_iso());
        }
        let bytes = serde_json::to_vec(&record)?;

        // One transaction: archive insert and live delete commit together,
        // so the order can never be in both places or in neither
        let txn = self.db.begin_write().map_err(transport_err)?;
        {
            let mut archive = txn
                .open_table(ARCHIVE_TABLE)
                .map_err(|e| StoreError::ArchiveWrite(e.to_string()))?;

            if let Some(prior) = archive
                .get(record.id)
                .map_err(|e| StoreError::ArchiveWrite(e.to_string()))?
            {
                let prior: Order = serde_json::from_slice(prior.value())?;
                tracing::info!(order_id = record.id, "order already archived, skipping");
                record = prior;
            } else {
                archive
                    .insert(record.id, bytes.as_slice())
                    .map_err(|e| StoreError::ArchiveWrite(e.to_string()))?;
            }

            let mut live = txn.open_table(LIVE_TABLE).map_err(transport_err)?;
            live.remove(record.id).map_err(transport_err)?;
        }
        txn.commit()
            .map_err(|e| StoreError::ArchiveWrite(e.to_string()))?;

        self.notify();
        Ok(record)
    }

    async fn history(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let txn = self.db.begin_read().map_err(transport_err)?;
        let table = txn.open_table(ARCHIVE_TABLE).map_err(transport_err)?;

        let mut orders = Vec::new();
        for entry in table.iter().map_err(transport_err)? {
            let (_, value) = entry.map_err(transport_err)?;
            orders.push(serde_json::from_slice::<Order>(value.value())?);
        }
        orders.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        orders.truncate(limit);
        Ok(orders)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Order>> {
        self.orders_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::lifecycle::OrderIds;
    use shared::order::{CartItem, ItemStatus, PaymentMethod};
    use std::time::Duration;

    fn cooking_order(ids: &OrderIds) -> Order {
        let order = lifecycle::checkout(
            ids,
            &[
                CartItem::new("Veg Atho", 1, 110.0),
                CartItem::new("Egg Atho", 1, 130.0),
            ],
            PaymentMethod::Gpay,
        )
        .unwrap();
        lifecycle::send_to_kitchen(&order).unwrap()
    }

    #[tokio::test]
    async fn test_path_patch_touches_one_field() {
        let adapter = KeyedStoreAdapter::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let order = cooking_order(&ids);
        adapter.store(&order).await.unwrap();

        let mut updates = PathUpdates::new();
        updates.insert("items/1/status".to_string(), serde_json::json!("ready"));
        adapter.patch(order.id, &updates).await.unwrap();

        let reloaded = adapter.load_all().await.unwrap();
        assert_eq!(reloaded[0].items[1].status, ItemStatus::Ready);
        assert_eq!(reloaded[0].items[0].status, ItemStatus::Cooking);
        assert_eq!(reloaded[0].status, order.status);
    }

    #[tokio::test]
    async fn test_patch_missing_order() {
        let adapter = KeyedStoreAdapter::open_in_memory().unwrap();
        let mut updates = PathUpdates::new();
        updates.insert("status".to_string(), serde_json::json!("ready"));

        assert!(matches!(
            adapter.patch(42, &updates).await,
            Err(StoreError::OrderNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_writer_observes_own_echo() {
        let adapter = KeyedStoreAdapter::open_in_memory().unwrap();
        let mut rx = adapter.subscribe();

        let ids = OrderIds::new();
        let order = cooking_order(&ids);
        adapter.store(&order).await.unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("writer should see its own echo")
            .unwrap();
        assert_eq!(snapshot, vec![order]);
    }

    #[tokio::test]
    async fn test_complete_is_atomic() {
        let adapter = KeyedStoreAdapter::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let order = cooking_order(&ids);
        adapter.store(&order).await.unwrap();

        let ready = lifecycle::dispatch_all(&order).unwrap();
        let completed = lifecycle::complete(&ready).unwrap();
        let archived = adapter.complete(&completed).await.unwrap();

        // In the archive, gone from the live set - never both, never neither
        assert!(adapter.load_all().await.unwrap().is_empty());
        let history = adapter.history(10).await.unwrap();
        assert_eq!(history, vec![archived]);
    }

    #[tokio::test]
    async fn test_complete_rejects_live_order() {
        let adapter = KeyedStoreAdapter::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let order = cooking_order(&ids);
        adapter.store(&order).await.unwrap();

        let result = adapter.complete(&order).await;
        assert!(matches!(result, Err(StoreError::ArchiveWrite(_))));
        assert_eq!(adapter.load_all().await.unwrap().len(), 1);
    }
}
