//! Shared types for the OderWall order pipeline
//!
//! Common types used across the store and hub crates: the order domain
//! model, the pure lifecycle state machine, money helpers, and the
//! message protocol spoken between the push server and its clients.

pub mod message;
pub mod order;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

// Order re-exports
pub use order::{
    CartItem, ItemStatus, Order, OrderId, OrderItem, OrderStatus, PaymentMethod,
};
