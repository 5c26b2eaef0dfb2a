//! Archive - write-once record of completed orders
//!
//! The archive is separate from the live store: once an order lands
//! here it never mutates again, and it must already have left (or be
//! about to leave) the live set. Append is idempotent per order id so
//! a retried complete cannot duplicate a record.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `archived_orders` | `order_id` | JSON-serialized `Order` | Completed orders |

use crate::error::{StoreError, StoreResult, transport_err};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::order::{Order, OrderStatus, lifecycle};
use std::path::Path;
use std::sync::Arc;

/// Table for archived orders: key = order id, value = JSON-serialized Order
const ARCHIVE_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("archived_orders");

/// Default page size for history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Append-only sink for completed orders, queryable newest-first
#[async_trait]
pub trait Archive: Send + Sync {
    /// Record a completed order
    ///
    /// Requires `status == completed`; stamps `completedAt` if absent.
    /// Appending an id that is already archived is a no-op returning the
    /// prior record.
    async fn append(&self, order: &Order) -> StoreResult<Order>;

    /// Archived orders ordered by `completedAt` descending
    async fn list(&self, limit: usize) -> StoreResult<Vec<Order>>;
}

/// Durable archive backed by redb
///
/// redb commits are persistent as soon as `commit()` returns (copy on
/// write with atomic pointer swap), so a power cut cannot leave the
/// archive file in an inconsistent state.
pub struct RedbArchive {
    db: Arc<Database>,
}

impl RedbArchive {
    /// Open or create the archive database at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path).map_err(transport_err)?;

        let write_txn = db.begin_write().map_err(transport_err)?;
        {
            let _ = write_txn.open_table(ARCHIVE_TABLE).map_err(transport_err)?;
        }
        write_txn.commit().map_err(transport_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory archive (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(transport_err)?;

        let write_txn = db.begin_write().map_err(transport_err)?;
        {
            let _ = write_txn.open_table(ARCHIVE_TABLE).map_err(transport_err)?;
        }
        write_txn.commit().map_err(transport_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn archive_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::ArchiveWrite(e.to_string())
}

#[async_trait]
impl Archive for RedbArchive {
    async fn append(&self, order: &Order) -> StoreResult<Order> {
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

        let txn = self.db.begin_write().map_err(archive_err)?;
        {
            let mut table = txn.open_table(ARCHIVE_TABLE).map_err(archive_err)?;

            if let Some(prior) = table.get(record.id).map_err(archive_err)? {
                let prior: Order = serde_json::from_slice(prior.value())?;
                tracing::info!(order_id = record.id, "order already archived, skipping");
                return Ok(prior);
            }

            table
                .insert(record.id, bytes.as_slice())
                .map_err(archive_err)?;
        }
        txn.commit().map_err(archive_err)?;

        tracing::debug!(order_id = record.id, "order archived");
        Ok(record)
    }

    async fn list(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let txn = self.db.begin_read().map_err(transport_err)?;
        let table = txn.open_table(ARCHIVE_TABLE).map_err(transport_err)?;

        let mut orders = Vec::new();
        for entry in table.iter().map_err(transport_err)? {
            let (_, value) = entry.map_err(transport_err)?;
            orders.push(serde_json::from_slice::<Order>(value.value())?);
        }

        // ISO timestamps sort lexicographically; id breaks same-instant ties
        orders.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        orders.truncate(limit);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::lifecycle::{self, OrderIds};
    use shared::order::{CartItem, PaymentMethod};

    fn completed_order(ids: &OrderIds) -> Order {
        let order = lifecycle::checkout(
            ids,
            &[CartItem::new("Tea", 1, 10.0)],
            PaymentMethod::Gpay,
        )
        .unwrap();
        let cooking = lifecycle::send_to_kitchen(&order).unwrap();
        let ready = lifecycle::dispatch_all(&cooking).unwrap();
        lifecycle::complete(&ready).unwrap()
    }

    #[tokio::test]
    async fn test_append_requires_completed() {
        let archive = RedbArchive::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let live = lifecycle::checkout(
            &ids,
            &[CartItem::new("Tea", 1, 10.0)],
            PaymentMethod::Gpay,
        )
        .unwrap();

        let result = archive.append(&live).await;
        assert!(matches!(result, Err(StoreError::ArchiveWrite(_))));
        assert!(archive.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_stamps_completed_at() {
        let archive = RedbArchive::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let mut order = completed_order(&ids);
        order.completed_at = None;

        let archived = archive.append(&order).await.unwrap();
        assert!(archived.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let archive = RedbArchive::open_in_memory().unwrap();
        let ids = OrderIds::new();
        let order = completed_order(&ids);

        let first = archive.append(&order).await.unwrap();
        let second = archive.append(&order).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(archive.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_bounded() {
        let archive = RedbArchive::open_in_memory().unwrap();
        let ids = OrderIds::new();

        let mut archived_ids = Vec::new();
        for _ in 0..5 {
            let order = completed_order(&ids);
            archived_ids.push(order.id);
            archive.append(&order).await.unwrap();
        }

        let listed = archive.list(3).await.unwrap();
        assert_eq!(listed.len(), 3);
        // Later checkouts have later ids and later completedAt stamps
        assert_eq!(listed[0].id, archived_ids[4]);
        assert_eq!(listed[1].id, archived_ids[3]);
    }
}
