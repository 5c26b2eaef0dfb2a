//! Typed payloads carried by bus messages

use crate::order::{Order, OrderId, PathUpdates};
use serde::{Deserialize, Serialize};

/// Handshake payload (client -> hub)
///
/// Carries the client's protocol version for validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Protocol version
    pub version: u16,
    /// Client display name (cashier / kitchen / customer screen)
    pub client_name: Option<String>,
    /// Client unique identifier (UUID)
    pub client_id: Option<String>,
}

/// update-order payload: a full replacement snapshot or a partial-path patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateOrderPayload {
    Full(Order),
    Patch(OrderPatch),
}

/// Partial-path patch for one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub id: OrderId,
    pub updates: PathUpdates,
}

/// complete-order payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompleteOrderPayload {
    pub id: OrderId,
}

/// delete-order payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeleteOrderPayload {
    pub id: OrderId,
}

fn default_history_limit() -> usize {
    50
}

/// get-history payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GetHistoryPayload {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for GetHistoryPayload {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

/// update-orders / history-data payload: an ordered list of orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrderListPayload {
    pub orders: Vec<Order>,
}

/// Error codes carried on failed responses
pub mod error_codes {
    pub const ORDER_NOT_FOUND: &str = "ORDER_NOT_FOUND";
    pub const DUPLICATE_ORDER: &str = "DUPLICATE_ORDER";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const ARCHIVE_WRITE: &str = "ARCHIVE_WRITE";
    pub const BAD_PAYLOAD: &str = "BAD_PAYLOAD";
}

/// Generic reply payload (hub -> requesting client only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub success: bool,
    pub message: String,
    /// Result data (e.g. the archived order on complete-order)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error code, only meaningful on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ResponsePayload {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error_code: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(code.into()),
        }
    }
}
