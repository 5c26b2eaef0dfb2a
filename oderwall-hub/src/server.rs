//! TCP server
//!
//! Accepts framed client connections and runs one task pair per client:
//! a read loop feeding messages into the dispatcher, and a forwarder
//! pushing `update-orders` broadcasts back out. Writes are applied
//! synchronously in the read loop, so each incoming message is one
//! atomic critical section over the shared list.
//!
//! ```text
//! Client ──▶ read loop ──▶ handle_message ──▶ reply (unicast)
//!                                │
//!                                └──▶ server_tx ──▶ every forwarder ──▶ all clients
//! ```

use crate::config::Config;
use crate::handler;
use crate::state::{HubResult, HubState};
use dashmap::DashMap;
use shared::message::{
    BusMessage, CodecError, EventType, HandshakePayload, OrderListPayload, PROTOCOL_VERSION,
    ResponsePayload, codec,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A connected client's write half, shared between reply and forwarder paths
type ClientWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

pub struct HubServer {
    config: Config,
    state: Arc<HubState>,
    server_tx: broadcast::Sender<BusMessage>,
    clients: Arc<DashMap<String, ClientWriter>>,
    shutdown: CancellationToken,
}

impl HubServer {
    pub fn new(config: Config, state: Arc<HubState>) -> Self {
        let (server_tx, _) = broadcast::channel(config.channel_capacity);
        Self {
            config,
            state,
            server_tx,
            clients: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token observed by every task; cancel it to stop the server
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Bind and serve until the shutdown token fires
    pub async fn run(&self) -> HubResult<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "hub listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("hub shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::debug!(%addr, "client connected");
                            self.spawn_client_handler(stream, addr);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_client_handler(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let server_tx = self.server_tx.clone();
        let clients = self.clients.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_client_connection(stream, addr, state, server_tx, clients, shutdown).await
            {
                tracing::debug!(%addr, "client handler finished: {}", e);
            }
        });
    }
}

async fn handle_client_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<HubState>,
    server_tx: broadcast::Sender<BusMessage>,
    clients: Arc<DashMap<String, ClientWriter>>,
    shutdown: CancellationToken,
) -> Result<(), CodecError> {
    let (mut read_half, write_half) = stream.into_split();
    let writer: ClientWriter = Arc::new(tokio::sync::Mutex::new(write_half));

    // Protocol handshake
    let client_id = match perform_handshake(&mut read_half, &writer, addr).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(%addr, error = %e, "handshake failed");
            return Err(e);
        }
    };

    clients.insert(client_id.clone(), writer.clone());
    tracing::debug!(client_id = %client_id, "client registered");

    // Initial snapshot, like every view expects on connect
    let initial = BusMessage::update_orders(&OrderListPayload {
        orders: state.snapshot(),
    });
    {
        let mut w = writer.lock().await;
        codec::write_message(&mut *w, &initial).await?;
    }

    let disconnect = CancellationToken::new();
    let forward_handle = spawn_forwarder(
        writer.clone(),
        server_tx.subscribe(),
        state.clone(),
        shutdown.clone(),
        disconnect.clone(),
        client_id.clone(),
    );

    // Read loop: every message is one atomic critical section
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            result = codec::read_message(&mut read_half) => {
                match result {
                    Ok(mut msg) => {
                        msg.source = Some(client_id.clone());
                        let dispatch = handler::handle_message(&state, &msg);

                        if let Some(reply) = dispatch.reply {
                            let mut w = writer.lock().await;
                            if let Err(e) = codec::write_message(&mut *w, &reply).await {
                                tracing::debug!(client_id = %client_id, error = %e, "reply write failed");
                                break;
                            }
                        }
                        if let Some(broadcast_msg) = dispatch.broadcast
                            && server_tx.send(broadcast_msg).is_err()
                        {
                            tracing::warn!("broadcast failed: no active receivers");
                        }
                    }
                    Err(CodecError::Disconnected) => {
                        tracing::debug!(client_id = %client_id, "client disconnected");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(client_id = %client_id, error = %e, "client read error");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    disconnect.cancel();
    drop(forward_handle);
    clients.remove(&client_id);
    tracing::debug!(client_id = %client_id, "client removed from registry");

    Ok(())
}

/// Validate the handshake and acknowledge it
async fn perform_handshake(
    read_half: &mut OwnedReadHalf,
    writer: &ClientWriter,
    addr: SocketAddr,
) -> Result<String, CodecError> {
    let msg = codec::read_message(read_half).await?;

    if msg.event_type != EventType::Handshake {
        let reply = BusMessage::response(&ResponsePayload::error(
            "expected handshake message",
            "BAD_HANDSHAKE",
        ))
        .with_correlation_id(msg.request_id);
        let mut w = writer.lock().await;
        let _ = codec::write_message(&mut *w, &reply).await;
        return Err(CodecError::Protocol("expected handshake message".to_string()));
    }

    let payload: HandshakePayload = match msg.parse_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(%addr, error = %e, "invalid handshake payload");
            return Err(CodecError::Protocol(format!("invalid handshake payload: {}", e)));
        }
    };

    if payload.version != PROTOCOL_VERSION {
        let reply = BusMessage::response(&ResponsePayload::error(
            format!(
                "protocol version mismatch: hub={}, client={}",
                PROTOCOL_VERSION, payload.version
            ),
            "VERSION_MISMATCH",
        ))
        .with_correlation_id(msg.request_id);
        let mut w = writer.lock().await;
        let _ = codec::write_message(&mut *w, &reply).await;
        return Err(CodecError::Protocol("protocol version mismatch".to_string()));
    }

    let client_id = payload
        .client_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::debug!(
        %addr,
        client_id = %client_id,
        client_name = payload.client_name.as_deref().unwrap_or("unknown"),
        "handshake ok"
    );

    let reply = BusMessage::response(&ResponsePayload::ok(format!(
        "connected as client {client_id}"
    )))
    .with_correlation_id(msg.request_id);
    let mut w = writer.lock().await;
    codec::write_message(&mut *w, &reply).await?;

    Ok(client_id)
}

/// Forward broadcasts to one client until it disconnects
fn spawn_forwarder(
    writer: ClientWriter,
    mut rx: broadcast::Receiver<BusMessage>,
    state: Arc<HubState>,
    shutdown: CancellationToken,
    disconnect: CancellationToken,
    client_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = disconnect.cancelled() => break,

                result = rx.recv() => {
                    match result {
                        Ok(msg) => {
                            let mut w = writer.lock().await;
                            if let Err(e) = codec::write_message(&mut *w, &msg).await {
                                tracing::debug!(client_id = %client_id, error = %e, "forward write failed");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(dropped)) => {
                            // Slow client fell behind: skip the backlog and
                            // resync it with one fresh snapshot
                            tracing::warn!(
                                client_id = %client_id,
                                dropped,
                                "client lagged, resyncing with full snapshot"
                            );
                            let resync = BusMessage::update_orders(&OrderListPayload {
                                orders: state.snapshot(),
                            });
                            let mut w = writer.lock().await;
                            if codec::write_message(&mut *w, &resync).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        tracing::debug!(client_id = %client_id, "forwarder stopped");
    })
}
