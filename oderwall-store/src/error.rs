//! Store errors
//!
//! Errors surface to the initiating view only; they are never
//! propagated to the other connected views. A transport failure does
//! not roll back the optimistic local state - the next subscription
//! snapshot reconciles it.

use shared::order::{LifecycleError, OrderId, PatchError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A rejected state transition (store unchanged)
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A rejected field-path patch (store unchanged)
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The adapter cannot reach its medium (network down, storage full)
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Archive append failed; the live-store removal did not proceed
    #[error("archive write failed: {0}")]
    ArchiveWrite(String),

    /// The push server refused the write (reported to this view only)
    #[error("write rejected by the push server: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Map a medium-level failure onto the transport taxonomy
pub(crate) fn transport_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::TransportUnavailable(e.to_string())
}
