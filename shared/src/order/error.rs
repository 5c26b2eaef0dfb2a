//! Lifecycle errors
//!
//! Every rejected transition leaves the order untouched; the caller
//! surfaces the error to the operator and nothing is persisted.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    /// Checkout attempted with an empty cart
    #[error("cannot checkout an empty cart")]
    InvalidCart,

    /// Transition requested against an order not in the required source state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Item-level operation with a bad index
    #[error("item index {index} out of range for order {order_id} ({len} items)")]
    IndexOutOfRange {
        order_id: super::OrderId,
        index: usize,
        len: usize,
    },

    /// Pending change must be a positive amount
    #[error("pending change amount must be positive, got {0}")]
    InvalidChangeAmount(f64),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
