//! Socket adapter - framed-TCP client of the push server
//!
//! The hub holds the authoritative order list; this adapter forwards
//! every write as a message, awaits the hub's correlated response, and
//! feeds the hub's `update-orders` broadcasts (which include the echo
//! of this client's own writes) to subscribers. Redundant re-renders
//! on echo are the contract here - snapshots replace state wholesale.

use super::{ORDERS_CHANNEL_CAPACITY, SyncAdapter};
use crate::error::{StoreError, StoreResult, transport_err};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::message::{
    BusMessage, CodecError, CompleteOrderPayload, DeleteOrderPayload, EventType,
    GetHistoryPayload, HandshakePayload, OrderListPayload, OrderPatch, PROTOCOL_VERSION,
    ResponsePayload, UpdateOrderPayload, codec, error_codes,
};
use shared::order::{Order, OrderId, PathUpdates};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

/// How long a request may wait for the hub's response
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<BusMessage>>>>;

pub struct SocketAdapter {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    orders_tx: broadcast::Sender<Vec<Order>>,
    pending: PendingMap,
    /// Ids present in the last hub snapshot; decides new-order vs update-order
    known: Arc<Mutex<HashSet<OrderId>>>,
    read_task: tokio::task::JoinHandle<()>,
}

impl SocketAdapter {
    /// Connect and handshake with the hub
    pub async fn connect(addr: &str, client_name: &str) -> StoreResult<Self> {
        let stream = TcpStream::connect(addr).await.map_err(transport_err)?;
        let (mut read_half, mut write_half) = stream.into_split();

        let handshake = BusMessage::handshake(&HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some(client_name.to_string()),
            client_id: Some(Uuid::new_v4().to_string()),
        });
        codec::write_message(&mut write_half, &handshake)
            .await
            .map_err(transport_err)?;

        let reply = codec::read_message(&mut read_half)
            .await
            .map_err(transport_err)?;
        if reply.event_type != EventType::Response {
            return Err(StoreError::TransportUnavailable(format!(
                "expected handshake response, got {}",
                reply.event_type
            )));
        }
        let ack: ResponsePayload = reply.parse_payload()?;
        if !ack.success {
            return Err(StoreError::TransportUnavailable(ack.message));
        }
        tracing::debug!(client_name, "connected to hub");

        let (orders_tx, _) = broadcast::channel(ORDERS_CHANNEL_CAPACITY);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let known = Arc::new(Mutex::new(HashSet::new()));

        let read_task = tokio::spawn(read_loop(
            read_half,
            orders_tx.clone(),
            pending.clone(),
            known.clone(),
        ));

        Ok(Self {
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            orders_tx,
            pending,
            known,
            read_task,
        })
    }

    async fn send(&self, msg: &BusMessage) -> StoreResult<()> {
        let mut writer = self.writer.lock().await;
        codec::write_message(&mut *writer, msg)
            .await
            .map_err(transport_err)
    }

    /// Send a message and await the hub's correlated response
    async fn request(&self, msg: BusMessage) -> StoreResult<BusMessage> {
        let request_id = msg.request_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if let Err(e) = self.send(&msg).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(StoreError::TransportUnavailable(
                "connection closed while awaiting response".to_string(),
            )),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(StoreError::TransportUnavailable(
                    "request timed out".to_string(),
                ))
            }
        }
    }

    /// Send a write, await the response, map hub rejections onto store errors
    async fn write_request(&self, msg: BusMessage, order_id: OrderId) -> StoreResult<ResponsePayload> {
        let reply = self.request(msg).await?;
        let payload: ResponsePayload = reply.parse_payload()?;
        if payload.success {
            return Ok(payload);
        }
        match payload.error_code.as_deref() {
            Some(error_codes::ORDER_NOT_FOUND) => Err(StoreError::OrderNotFound(order_id)),
            Some(error_codes::ARCHIVE_WRITE) => Err(StoreError::ArchiveWrite(payload.message)),
            _ => Err(StoreError::Rejected(payload.message)),
        }
    }
}

impl Drop for SocketAdapter {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    orders_tx: broadcast::Sender<Vec<Order>>,
    pending: PendingMap,
    known: Arc<Mutex<HashSet<OrderId>>>,
) {
    loop {
        match codec::read_message(&mut reader).await {
            Ok(msg) => {
                if msg.event_type == EventType::UpdateOrders {
                    match msg.parse_payload::<OrderListPayload>() {
                        Ok(payload) => {
                            {
                                let mut known = known.lock();
                                known.clear();
                                known.extend(payload.orders.iter().map(|o| o.id));
                            }
                            let _ = orders_tx.send(payload.orders);
                        }
                        Err(e) => tracing::warn!(error = %e, "malformed update-orders payload"),
                    }
                }

                if let Some(correlation) = msg.correlation_id
                    && let Some(tx) = pending.lock().remove(&correlation)
                {
                    let _ = tx.send(msg);
                }
            }
            Err(CodecError::Disconnected) => {
                tracing::info!("hub connection closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "hub read failed");
                break;
            }
        }
    }
}

#[async_trait]
impl SyncAdapter for SocketAdapter {
    async fn load_all(&self) -> StoreResult<Vec<Order>> {
        let reply = self.request(BusMessage::get_orders()).await?;
        if reply.event_type != EventType::UpdateOrders {
            return Err(StoreError::TransportUnavailable(format!(
                "expected update-orders, got {}",
                reply.event_type
            )));
        }
        let payload: OrderListPayload = reply.parse_payload()?;
        Ok(payload.orders)
    }

    async fn store(&self, order: &Order) -> StoreResult<()> {
        let seen = self.known.lock().contains(&order.id);
        let msg = if seen {
            BusMessage::update_order(&UpdateOrderPayload::Full(order.clone()))
        } else {
            BusMessage::new_order(order)
        };
        self.write_request(msg, order.id).await?;
        Ok(())
    }

    async fn patch(&self, order_id: OrderId, updates: &PathUpdates) -> StoreResult<()> {
        let msg = BusMessage::update_order(&UpdateOrderPayload::Patch(OrderPatch {
            id: order_id,
            updates: updates.clone(),
        }));
        self.write_request(msg, order_id).await?;
        Ok(())
    }

    async fn remove(&self, order_id: OrderId) -> StoreResult<()> {
        let msg = BusMessage::delete_order(&DeleteOrderPayload { id: order_id });
        self.write_request(msg, order_id).await?;
        Ok(())
    }

    async fn complete(&self, order: &Order) -> StoreResult<Order> {
        let msg = BusMessage::complete_order(&CompleteOrderPayload { id: order.id });
        let payload = self.write_request(msg, order.id).await?;

        let archived = payload.data.ok_or_else(|| {
            StoreError::TransportUnavailable("complete response carried no order".to_string())
        })?;
        Ok(serde_json::from_value(archived)?)
    }

    async fn history(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let reply = self
            .request(BusMessage::get_history(&GetHistoryPayload { limit }))
            .await?;
        if reply.event_type != EventType::HistoryData {
            return Err(StoreError::TransportUnavailable(format!(
                "expected history-data, got {}",
                reply.event_type
            )));
        }
        let payload: OrderListPayload = reply.parse_payload()?;
        Ok(payload.orders)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Order>> {
        self.orders_tx.subscribe()
    }
}
