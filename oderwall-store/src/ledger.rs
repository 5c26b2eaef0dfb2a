//! Change ledger - cash owed back to customers
//!
//! A derived view over the live set filtered to orders flagged with
//! pending change. No storage of its own: the attach/clear mutators
//! live on the store, and the ledger re-derives from whatever the
//! store currently holds.

use crate::store::OrderStore;
use shared::order::{Order, money};
use std::sync::Arc;

pub struct ChangeLedger {
    store: Arc<OrderStore>,
}

impl ChangeLedger {
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }

    /// Orders with change still owed
    pub fn list(&self) -> Vec<Order> {
        self.store
            .get_all()
            .into_iter()
            .filter(|o| o.has_pending_change())
            .collect()
    }

    /// Badge count for the cashier screen
    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Total cash owed across all flagged orders
    pub fn total_owed(&self) -> f64 {
        let total = self
            .list()
            .iter()
            .filter_map(|o| o.pending_change_amount)
            .map(money::to_decimal)
            .sum::<rust_decimal::Decimal>();
        money::to_f64(total)
    }
}
