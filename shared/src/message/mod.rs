//! Message types for the push-server transport
//!
//! These types are shared between the hub and its clients, for both
//! in-process and network (framed TCP) communication. Event names map
//! one-to-one onto the socket surface the views speak: a client emits
//! `new-order` / `update-order` / `complete-order` / `delete-order` and
//! asks with `get-orders` / `get-history`; the hub answers with
//! `update-orders` (full list) broadcasts, `history-data`, and
//! correlated `response` messages.

pub mod codec;
pub mod payload;

pub use codec::{read_message, write_message, CodecError};
pub use payload::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Message bus event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Connection handshake
    Handshake = 0,
    /// Client placed a new order
    NewOrder = 1,
    /// Client replaced or patched one order
    UpdateOrder = 2,
    /// Client completed an order (archive + remove)
    CompleteOrder = 3,
    /// Client removed an order from the live set
    DeleteOrder = 4,
    /// Client asks for the current live set
    GetOrders = 5,
    /// Client asks for archived history
    GetHistory = 6,
    /// Hub broadcast: full updated live set
    UpdateOrders = 7,
    /// Hub reply: archived orders, newest first
    HistoryData = 8,
    /// Hub reply to a client request
    Response = 9,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Handshake),
            1 => Ok(EventType::NewOrder),
            2 => Ok(EventType::UpdateOrder),
            3 => Ok(EventType::CompleteOrder),
            4 => Ok(EventType::DeleteOrder),
            5 => Ok(EventType::GetOrders),
            6 => Ok(EventType::GetHistory),
            7 => Ok(EventType::UpdateOrders),
            8 => Ok(EventType::HistoryData),
            9 => Ok(EventType::Response),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Handshake => write!(f, "handshake"),
            EventType::NewOrder => write!(f, "new-order"),
            EventType::UpdateOrder => write!(f, "update-order"),
            EventType::CompleteOrder => write!(f, "complete-order"),
            EventType::DeleteOrder => write!(f, "delete-order"),
            EventType::GetOrders => write!(f, "get-orders"),
            EventType::GetHistory => write!(f, "get-history"),
            EventType::UpdateOrders => write!(f, "update-orders"),
            EventType::HistoryData => write!(f, "history-data"),
            EventType::Response => write!(f, "response"),
        }
    }
}

/// Message bus envelope
///
/// `source` is injected by the hub when a message arrives over the wire;
/// it is not part of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    pub source: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            source: None,
            correlation_id: None,
            payload,
        }
    }

    /// Set correlation id (used for request/response pairing)
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    fn with_json<T: Serialize>(event_type: EventType, payload: &T) -> Self {
        let payload = serde_json::to_vec(payload).expect("Failed to serialize message payload");
        Self::new(event_type, payload)
    }

    pub fn handshake(payload: &HandshakePayload) -> Self {
        Self::with_json(EventType::Handshake, payload)
    }

    pub fn new_order(order: &crate::order::Order) -> Self {
        Self::with_json(EventType::NewOrder, order)
    }

    pub fn update_order(payload: &UpdateOrderPayload) -> Self {
        Self::with_json(EventType::UpdateOrder, payload)
    }

    pub fn complete_order(payload: &CompleteOrderPayload) -> Self {
        Self::with_json(EventType::CompleteOrder, payload)
    }

    pub fn delete_order(payload: &DeleteOrderPayload) -> Self {
        Self::with_json(EventType::DeleteOrder, payload)
    }

    pub fn get_orders() -> Self {
        Self::new(EventType::GetOrders, Vec::new())
    }

    pub fn get_history(payload: &GetHistoryPayload) -> Self {
        Self::with_json(EventType::GetHistory, payload)
    }

    pub fn update_orders(payload: &OrderListPayload) -> Self {
        Self::with_json(EventType::UpdateOrders, payload)
    }

    pub fn history_data(payload: &OrderListPayload) -> Self {
        Self::with_json(EventType::HistoryData, payload)
    }

    pub fn response(payload: &ResponsePayload) -> Self {
        Self::with_json(EventType::Response, payload)
    }

    /// Parse the payload as the given type
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::lifecycle::{self, OrderIds};
    use crate::order::{CartItem, PaymentMethod};

    #[test]
    fn test_event_type_round_trip() {
        for value in 0..=9u8 {
            let event = EventType::try_from(value).unwrap();
            assert_eq!(event as u8, value);
        }
        assert!(EventType::try_from(42).is_err());
    }

    #[test]
    fn test_event_type_names_match_surface() {
        assert_eq!(EventType::NewOrder.to_string(), "new-order");
        assert_eq!(EventType::UpdateOrders.to_string(), "update-orders");
        assert_eq!(EventType::HistoryData.to_string(), "history-data");
    }

    #[test]
    fn test_new_order_payload_parses_back() {
        let ids = OrderIds::new();
        let order = lifecycle::checkout(
            &ids,
            &[CartItem::new("Tea", 2, 10.0)],
            PaymentMethod::Gpay,
        )
        .unwrap();

        let msg = BusMessage::new_order(&order);
        assert_eq!(msg.event_type, EventType::NewOrder);
        assert!(!msg.request_id.is_nil());

        let parsed: crate::order::Order = msg.parse_payload().unwrap();
        assert_eq!(parsed, order);
    }

    #[test]
    fn test_response_correlation() {
        let request = BusMessage::get_orders();
        let reply = BusMessage::response(&ResponsePayload::ok("done"))
            .with_correlation_id(request.request_id);
        assert_eq!(reply.correlation_id, Some(request.request_id));
    }
}
