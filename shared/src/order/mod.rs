//! Order Domain Module
//!
//! This module provides the order domain for the POS pipeline:
//! - Model: Order / OrderItem records and their closed status enums
//! - Lifecycle: pure transition functions (checkout, send to kitchen,
//!   dispatch, complete, pending change)
//! - Patch: field-path partial updates for transports that support them
//! - Money: precise decimal arithmetic for totals and change

pub mod error;
pub mod lifecycle;
pub mod model;
pub mod money;
pub mod patch;

// Re-exports
pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::OrderIds;
pub use model::{CartItem, ItemStatus, Order, OrderId, OrderItem, OrderStatus, PaymentMethod};
pub use patch::{PatchError, PathUpdates, apply_updates};
