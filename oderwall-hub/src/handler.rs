//! Message dispatch
//!
//! One incoming client message in, one unicast reply out, plus the
//! `update-orders` broadcast when the live list changed. Rejections
//! only ever reach the writer; the other views never see them.

use crate::state::{HubError, HubState};
use shared::message::{
    BusMessage, CompleteOrderPayload, DeleteOrderPayload, EventType, GetHistoryPayload,
    OrderListPayload, ResponsePayload, UpdateOrderPayload, error_codes,
};
use shared::order::Order;

/// Result of handling one message
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Broadcast to every connected client (writer included)
    pub broadcast: Option<BusMessage>,
    /// Unicast reply to the writer
    pub reply: Option<BusMessage>,
}

impl Dispatch {
    fn reply_only(reply: BusMessage) -> Self {
        Self {
            broadcast: None,
            reply: Some(reply),
        }
    }

    fn committed(snapshot: Vec<Order>, reply: BusMessage) -> Self {
        Self {
            broadcast: Some(BusMessage::update_orders(&OrderListPayload {
                orders: snapshot,
            })),
            reply: Some(reply),
        }
    }
}

fn error_code(e: &HubError) -> &'static str {
    match e {
        HubError::OrderNotFound(_) => error_codes::ORDER_NOT_FOUND,
        HubError::DuplicateOrder(_) => error_codes::DUPLICATE_ORDER,
        HubError::InvalidTransition(_) | HubError::Patch(_) => error_codes::INVALID_TRANSITION,
        HubError::ArchiveWrite(_) => error_codes::ARCHIVE_WRITE,
        HubError::Io(_) | HubError::Serialization(_) => error_codes::BAD_PAYLOAD,
    }
}

fn rejection(msg: &BusMessage, e: &HubError) -> BusMessage {
    tracing::warn!(
        event = %msg.event_type,
        source = msg.source.as_deref().unwrap_or("unknown"),
        error = %e,
        "write rejected"
    );
    BusMessage::response(&ResponsePayload::error(e.to_string(), error_code(e)))
        .with_correlation_id(msg.request_id)
}

fn bad_payload(msg: &BusMessage, e: serde_json::Error) -> Dispatch {
    tracing::warn!(event = %msg.event_type, error = %e, "malformed payload");
    Dispatch::reply_only(
        BusMessage::response(&ResponsePayload::error(
            format!("malformed {} payload: {}", msg.event_type, e),
            error_codes::BAD_PAYLOAD,
        ))
        .with_correlation_id(msg.request_id),
    )
}

/// Apply one client message to the hub state
pub fn handle_message(state: &HubState, msg: &BusMessage) -> Dispatch {
    match msg.event_type {
        EventType::NewOrder => {
            let order: Order = match msg.parse_payload() {
                Ok(order) => order,
                Err(e) => return bad_payload(msg, e),
            };
            let order_id = order.id;
            match state.insert(order) {
                Ok(snapshot) => {
                    tracing::info!(order_id, "new order");
                    Dispatch::committed(
                        snapshot,
                        BusMessage::response(&ResponsePayload::ok("order placed"))
                            .with_correlation_id(msg.request_id),
                    )
                }
                Err(e) => Dispatch::reply_only(rejection(msg, &e)),
            }
        }

        EventType::UpdateOrder => {
            let payload: UpdateOrderPayload = match msg.parse_payload() {
                Ok(payload) => payload,
                Err(e) => return bad_payload(msg, e),
            };
            match state.update(payload) {
                Ok(snapshot) => Dispatch::committed(
                    snapshot,
                    BusMessage::response(&ResponsePayload::ok("order updated"))
                        .with_correlation_id(msg.request_id),
                ),
                Err(e) => Dispatch::reply_only(rejection(msg, &e)),
            }
        }

        EventType::CompleteOrder => {
            let payload: CompleteOrderPayload = match msg.parse_payload() {
                Ok(payload) => payload,
                Err(e) => return bad_payload(msg, e),
            };
            match state.complete(payload.id) {
                Ok((archived, snapshot)) => {
                    let data = serde_json::to_value(&archived)
                        .unwrap_or(serde_json::Value::Null);
                    Dispatch::committed(
                        snapshot,
                        BusMessage::response(&ResponsePayload::ok_with_data(
                            "order completed",
                            data,
                        ))
                        .with_correlation_id(msg.request_id),
                    )
                }
                Err(e) => Dispatch::reply_only(rejection(msg, &e)),
            }
        }

        EventType::DeleteOrder => {
            let payload: DeleteOrderPayload = match msg.parse_payload() {
                Ok(payload) => payload,
                Err(e) => return bad_payload(msg, e),
            };
            match state.remove(payload.id) {
                Ok(snapshot) => Dispatch::committed(
                    snapshot,
                    BusMessage::response(&ResponsePayload::ok("order removed"))
                        .with_correlation_id(msg.request_id),
                ),
                Err(e) => Dispatch::reply_only(rejection(msg, &e)),
            }
        }

        EventType::GetOrders => Dispatch::reply_only(
            BusMessage::update_orders(&OrderListPayload {
                orders: state.snapshot(),
            })
            .with_correlation_id(msg.request_id),
        ),

        EventType::GetHistory => {
            let payload: GetHistoryPayload = msg.parse_payload().unwrap_or_default();
            Dispatch::reply_only(
                BusMessage::history_data(&OrderListPayload {
                    orders: state.history(payload.limit),
                })
                .with_correlation_id(msg.request_id),
            )
        }

        // Server-originated or handshake traffic has no business here
        _ => {
            tracing::warn!(event = %msg.event_type, "unexpected client message, dropping");
            Dispatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::lifecycle::{self, OrderIds};
    use shared::order::{CartItem, PaymentMethod};

    fn test_state() -> (tempfile::TempDir, HubState) {
        let dir = tempfile::tempdir().unwrap();
        let state = HubState::load(dir.path(), 50).unwrap();
        (dir, state)
    }

    fn ready_order(ids: &OrderIds) -> Order {
        let order = lifecycle::checkout(
            ids,
            &[CartItem::new("Tea", 2, 10.0)],
            PaymentMethod::Gpay,
        )
        .unwrap();
        lifecycle::dispatch_all(&lifecycle::send_to_kitchen(&order).unwrap()).unwrap()
    }

    #[test]
    fn test_new_order_broadcasts_and_replies() {
        let (_dir, state) = test_state();
        let ids = OrderIds::new();
        let order = lifecycle::checkout(
            &ids,
            &[CartItem::new("Tea", 1, 10.0)],
            PaymentMethod::Cash,
        )
        .unwrap();

        let msg = BusMessage::new_order(&order);
        let dispatch = handle_message(&state, &msg);

        let broadcast = dispatch.broadcast.expect("accepted write must broadcast");
        assert_eq!(broadcast.event_type, EventType::UpdateOrders);
        let list: OrderListPayload = broadcast.parse_payload().unwrap();
        assert_eq!(list.orders, vec![order]);

        let reply = dispatch.reply.unwrap();
        assert_eq!(reply.correlation_id, Some(msg.request_id));
        let ack: ResponsePayload = reply.parse_payload().unwrap();
        assert!(ack.success);
    }

    #[test]
    fn test_rejection_is_unicast_only() {
        let (_dir, state) = test_state();
        let msg = BusMessage::complete_order(&CompleteOrderPayload { id: 404 });
        let dispatch = handle_message(&state, &msg);

        assert!(dispatch.broadcast.is_none());
        let ack: ResponsePayload = dispatch.reply.unwrap().parse_payload().unwrap();
        assert!(!ack.success);
        assert_eq!(
            ack.error_code.as_deref(),
            Some(error_codes::ORDER_NOT_FOUND)
        );
    }

    #[test]
    fn test_complete_reply_carries_archived_order() {
        let (_dir, state) = test_state();
        let ids = OrderIds::new();
        let ready = ready_order(&ids);
        state.insert(ready.clone()).unwrap();

        let msg = BusMessage::complete_order(&CompleteOrderPayload { id: ready.id });
        let dispatch = handle_message(&state, &msg);

        let ack: ResponsePayload = dispatch.reply.unwrap().parse_payload().unwrap();
        assert!(ack.success);
        let archived: Order = serde_json::from_value(ack.data.unwrap()).unwrap();
        assert_eq!(archived.id, ready.id);
        assert!(archived.completed_at.is_some());
    }

    #[test]
    fn test_get_history_replies_with_data() {
        let (_dir, state) = test_state();
        let ids = OrderIds::new();
        let ready = ready_order(&ids);
        state.insert(ready.clone()).unwrap();
        state.complete(ready.id).unwrap();

        let msg = BusMessage::get_history(&GetHistoryPayload { limit: 10 });
        let dispatch = handle_message(&state, &msg);

        let reply = dispatch.reply.unwrap();
        assert_eq!(reply.event_type, EventType::HistoryData);
        let list: OrderListPayload = reply.parse_payload().unwrap();
        assert_eq!(list.orders.len(), 1);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let (_dir, state) = test_state();
        let msg = BusMessage::new(EventType::NewOrder, b"not json".to_vec());
        let dispatch = handle_message(&state, &msg);

        assert!(dispatch.broadcast.is_none());
        let ack: ResponsePayload = dispatch.reply.unwrap().parse_payload().unwrap();
        assert_eq!(ack.error_code.as_deref(), Some(error_codes::BAD_PAYLOAD));
    }
}
