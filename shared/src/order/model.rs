//! Order model - the records every view and transport agrees on
//!
//! Field names and status strings are the wire format: orders are
//! serialized as camelCase key-value records with lowercase status
//! values, and `items` is an ordered list (insertion order = cart
//! order). Unknown status strings are rejected at deserialization
//! rather than propagated.

use serde::{Deserialize, Serialize};

/// Order identifier - derived from the creation timestamp (epoch millis),
/// bumped when two checkouts land on the same millisecond.
pub type OrderId = i64;

/// Status of a single line item, mutated independently by kitchen staff
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Cooking,
    Ready,
}

/// Order status - drives which view displays the order
///
/// "Partially ready" is a derived view condition, never a stored value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Cooking,
    Ready,
    Completed,
}

/// Payment method chosen at checkout (gpay = any non-cash digital method)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Gpay,
}

/// Cart line as assembled on the cashier screen
///
/// Name and price are captured from the catalog at cart-add time; later
/// catalog edits never touch a placed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

impl CartItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
        }
    }
}

/// Line item inside a placed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default)]
    pub status: ItemStatus,
}

/// One customer transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique id, immutable after creation
    pub id: OrderId,
    /// Ordered line items (non-empty at creation)
    pub items: Vec<OrderItem>,
    /// Total computed at checkout, immutable after creation
    pub total: f64,
    pub status: OrderStatus,
    /// Set at checkout, immutable
    pub payment_method: PaymentMethod,
    /// Creation time, ISO-8601
    pub timestamp: String,
    /// Present only when cash was tendered in excess and change deferred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_change: Option<bool>,
    /// Amount owed back to the customer; present iff pending_change is true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_change_amount: Option<f64>,
    /// Set when the order is archived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Order {
    /// Number of line items currently marked ready
    pub fn ready_item_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Ready)
            .count()
    }

    /// Every item is ready (false for an empty item list)
    pub fn all_items_ready(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.status == ItemStatus::Ready)
    }

    /// Derived view condition: at least one but not all items ready
    pub fn is_partially_ready(&self) -> bool {
        let ready = self.ready_item_count();
        ready > 0 && ready < self.items.len()
    }

    /// Whether change is still owed to the customer
    pub fn has_pending_change(&self) -> bool {
        self.pending_change == Some(true)
    }

    /// Last four digits of the id, as printed on every screen
    pub fn short_id(&self) -> String {
        let id = self.id.to_string();
        let cut = id.len().saturating_sub(4);
        id[cut..].to_string()
    }

    /// "2x Tea, 1x Water" summary line
    pub fn items_summary(&self) -> String {
        self.items
            .iter()
            .map(|i| format!("{}x {}", i.quantity, i.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Search-box matching: id substring or item name substring
    pub fn matches_search(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let term = term.to_lowercase();
        self.id.to_string().contains(&term)
            || self
                .items
                .iter()
                .any(|i| i.name.to_lowercase().contains(&term))
    }
}
