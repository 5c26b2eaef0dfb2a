//! Authoritative hub state - the live list and the archive
//!
//! One in-memory order list plus a bounded history, both persisted to
//! JSON files in the data directory on every mutation. Mutations run
//! under a single lock: each incoming client message is one atomic
//! critical section, so no concurrent mutation can interleave
//! mid-handler.
//!
//! Completing an order is archive-append-then-remove, never the
//! reverse: when persisting the history fails, the live list is left
//! untouched and the error goes back to the writer alone.

use parking_lot::Mutex;
use shared::message::UpdateOrderPayload;
use shared::order::{Order, OrderId, apply_updates, lifecycle};
use std::path::PathBuf;
use thiserror::Error;

const ORDERS_FILE: &str = "orders.json";
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Error)]
pub enum HubError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("duplicate order id: {0}")]
    DuplicateOrder(OrderId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid patch: {0}")]
    Patch(#[from] shared::order::PatchError),

    #[error("archive write failed: {0}")]
    ArchiveWrite(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HubResult<T> = Result<T, HubError>;

struct Inner {
    orders: Vec<Order>,
    history: Vec<Order>,
}

pub struct HubState {
    inner: Mutex<Inner>,
    data_dir: PathBuf,
    history_limit: usize,
}

impl HubState {
    /// Load persisted state from the data directory, creating it if needed
    pub fn load(data_dir: impl Into<PathBuf>, history_limit: usize) -> HubResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let orders = read_json_list(&data_dir.join(ORDERS_FILE))?;
        let history = read_json_list(&data_dir.join(HISTORY_FILE))?;
        tracing::info!(
            live = orders.len(),
            archived = history.len(),
            "hub state loaded"
        );

        Ok(Self {
            inner: Mutex::new(Inner { orders, history }),
            data_dir,
            history_limit,
        })
    }

    /// Current live list
    pub fn snapshot(&self) -> Vec<Order> {
        self.inner.lock().orders.clone()
    }

    /// Archived orders, newest first, capped at the configured limit
    pub fn history(&self, limit: usize) -> Vec<Order> {
        let inner = self.inner.lock();
        let mut orders = inner.history.clone();
        orders.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        orders.truncate(limit.min(self.history_limit));
        orders
    }

    /// new-order: add an order to the live list
    ///
    /// Id uniqueness holds across the live list and the archive
    /// combined; a duplicate is rejected rather than replaced.
    pub fn insert(&self, order: Order) -> HubResult<Vec<Order>> {
        let mut inner = self.inner.lock();
        if inner.orders.iter().any(|o| o.id == order.id)
            || inner.history.iter().any(|o| o.id == order.id)
        {
            return Err(HubError::DuplicateOrder(order.id));
        }

        inner.orders.push(order);
        self.persist_orders(&inner.orders)?;
        Ok(inner.orders.clone())
    }

    /// update-order: replace one order or apply a partial-path patch
    ///
    /// Last write observed wins; there is no merge and no version check.
    pub fn update(&self, payload: UpdateOrderPayload) -> HubResult<Vec<Order>> {
        let mut inner = self.inner.lock();

        match payload {
            UpdateOrderPayload::Full(order) => {
                let slot = inner
                    .orders
                    .iter_mut()
                    .find(|o| o.id == order.id)
                    .ok_or(HubError::OrderNotFound(order.id))?;
                *slot = order;
            }
            UpdateOrderPayload::Patch(patch) => {
                let slot = inner
                    .orders
                    .iter_mut()
                    .find(|o| o.id == patch.id)
                    .ok_or(HubError::OrderNotFound(patch.id))?;
                *slot = apply_updates(slot, &patch.updates)?;
            }
        }

        self.persist_orders(&inner.orders)?;
        Ok(inner.orders.clone())
    }

    /// delete-order: remove an order from the live list
    pub fn remove(&self, order_id: OrderId) -> HubResult<Vec<Order>> {
        let mut inner = self.inner.lock();
        let before = inner.orders.len();
        inner.orders.retain(|o| o.id != order_id);
        if inner.orders.len() == before {
            return Err(HubError::OrderNotFound(order_id));
        }

        self.persist_orders(&inner.orders)?;
        Ok(inner.orders.clone())
    }

    /// complete-order: archive the order, then remove it from the live list
    ///
    /// Returns the archived record and the new live snapshot.
    pub fn complete(&self, order_id: OrderId) -> HubResult<(Order, Vec<Order>)> {
        let mut inner = self.inner.lock();

        let order = inner
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or(HubError::OrderNotFound(order_id))?;

        // The hub enforces the state machine too: completion requires ready
        let archived = lifecycle::complete(&order)
            .map_err(|e| HubError::InvalidTransition(e.to_string()))?;

        // Archive durably first; a failed append leaves the order live
        let mut history = inner.history.clone();
        history.push(archived.clone());
        self.persist_history(&history)
            .map_err(|e| HubError::ArchiveWrite(e.to_string()))?;
        inner.history = history;

        inner.orders.retain(|o| o.id != order_id);
        self.persist_orders(&inner.orders)?;

        tracing::info!(order_id, "order completed and archived");
        Ok((archived, inner.orders.clone()))
    }

    fn persist_orders(&self, orders: &[Order]) -> HubResult<()> {
        write_json_list(&self.data_dir.join(ORDERS_FILE), orders)
    }

    fn persist_history(&self, history: &[Order]) -> HubResult<()> {
        write_json_list(&self.data_dir.join(HISTORY_FILE), history)
    }
}

fn read_json_list(path: &PathBuf) -> HubResult<Vec<Order>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json_list(path: &PathBuf, orders: &[Order]) -> HubResult<()> {
    let json = serde_json::to_vec_pretty(orders)?;
    std::fs::write(path, json)?;
    Ok(())
}
