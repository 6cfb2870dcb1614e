//! Roomcast production server.
//!
//! A minimal publish/subscribe layer over persistent WebSocket connections:
//! the server accepts connections, groups them into named rooms, and routes
//! messages either to a single client or to a room's members.
//!
//! # Architecture
//!
//! The [`Router`] is Sans-IO: it owns the [`Registry`] and [`RoomDirectory`],
//! processes events, and returns actions. This crate wraps it with real I/O -
//! [`Server`] runs the accept loop, executes router actions over WebSocket
//! sinks, and surfaces accept/message/close hooks to the embedding process
//! through a notification channel.
//!
//! All router mutations are serialized behind one `tokio::sync::Mutex`, so
//! every transport event is handled as an atomic unit with respect to the
//! registry, the directory, and room membership. Broadcast fan-out happens
//! after the membership snapshot is taken under that lock; a connection that
//! closes mid-broadcast is silently skipped, never an error for the whole
//! broadcast.
//!
//! # Components
//!
//! - [`Router`]: event→action orchestrator (pure logic, no I/O)
//! - [`Server`]: production runtime executing router actions
//! - [`ServerHandle`]: room-creation factory and room broadcast for the
//!   embedding process
//! - [`WsTransport`]: WebSocket listener via `tokio-tungstenite`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod error;
mod registry;
mod rooms;
mod router;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use roomcast_proto::RoomInfo;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub use env::{Environment, SystemEnv};
pub use error::ServerError;
pub use registry::{Connection, ConnectionId, ConnectionState, DuplicateIdentity, Registry};
pub use rooms::{Room, RoomDirectory, RoomId};
pub use router::{
    LogLevel, RoomContext, Router, RouterAction, RouterConfig, RouterError, RouterEvent,
};
pub use transport::{WsConnection, WsTransport};

/// Shared state for all connections.
///
/// Outbound traffic goes through one unbounded channel per connection; a
/// dedicated writer task drains it into the WebSocket sink, preserving
/// per-connection delivery order.
struct SharedState {
    /// Connection id → outbound message channel.
    outbound: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<WsMessage>>>,
    /// Hooks surfaced to the embedding process.
    notifications: mpsc::UnboundedSender<ServerNotification>,
}

/// Notifications surfaced to the embedding process.
#[derive(Debug, Clone)]
pub enum ServerNotification {
    /// A new connection was accepted.
    Connected {
        /// The new connection.
        connection_id: ConnectionId,
    },

    /// An application payload arrived, routing metadata already stripped.
    Message {
        /// The sending connection.
        connection_id: ConnectionId,
        /// The user payload.
        payload: Value,
        /// Resolved room context; `None` when the routing field did not
        /// resolve (delivery is permissive either way).
        room: Option<RoomContext>,
    },

    /// A connection closed.
    Disconnected {
        /// The closed connection.
        connection_id: ConnectionId,
        /// Pre-removal snapshot of the other open connections.
        open_peers: Vec<ConnectionId>,
    },
}

/// Server runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:9000").
    pub bind_address: String,
    /// Router configuration (connection limits).
    pub router: RouterConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:9000".to_string(), router: RouterConfig::default() }
    }
}

/// Production Roomcast server.
///
/// Wraps the [`Router`] with WebSocket transport and the system environment.
pub struct Server {
    router: Arc<Mutex<Router<SystemEnv>>>,
    transport: WsTransport,
    shared: Arc<SharedState>,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// Returns the server plus the notification receiver carrying the
    /// accept/message/close hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid bind address, or
    /// [`ServerError::Transport`] if binding fails.
    pub async fn bind(
        config: ServerRuntimeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerNotification>), ServerError> {
        let transport = WsTransport::bind(&config.bind_address).await?;
        let router = Arc::new(Mutex::new(Router::new(SystemEnv::new(), config.router)));

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState {
            outbound: RwLock::new(HashMap::new()),
            notifications: notify_tx,
        });

        Ok((Self { router, transport, shared }, notify_rx))
    }

    /// A cloneable handle for the embedding process.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { router: Arc::clone(&self.router), shared: Arc::clone(&self.shared) }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and routing messages.
    ///
    /// Runs until an accept-loop error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let router = Arc::clone(&self.router);
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, router, shared).await {
                            tracing::debug!("connection error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Handle to a running server for the embedding process.
///
/// Exposes the room-creation factory and room broadcast without granting
/// access to the router's internals.
#[derive(Clone)]
pub struct ServerHandle {
    router: Arc<Mutex<Router<SystemEnv>>>,
    shared: Arc<SharedState>,
}

impl ServerHandle {
    /// Create a room, returning its resolved identity.
    pub async fn create_room(&self, requested_name: &str) -> RoomInfo {
        let (info, actions) = {
            let mut router = self.router.lock().await;
            router.create_room(requested_name)
        };

        execute_actions(actions, &self.shared).await;
        info
    }

    /// Broadcast an application payload to every member of a room.
    ///
    /// The membership snapshot is taken under the router lock; sends fan out
    /// afterwards and silently skip connections that closed in between.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RoomNotFound`] (wrapped) if no room has the
    /// given resolved name.
    pub async fn broadcast(
        &self,
        room: &str,
        payload: &Value,
        exclude: Option<ConnectionId>,
    ) -> Result<(), ServerError> {
        let actions = {
            let router = self.router.lock().await;
            router.broadcast(room, payload, exclude)?
        };

        execute_actions(actions, &self.shared).await;
        Ok(())
    }
}

/// Handle a single WebSocket connection from accept to teardown.
async fn handle_connection(
    conn: WsConnection,
    router: Arc<Mutex<Router<SystemEnv>>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let peer = conn.peer_addr();

    let (ws_sink, mut ws_stream) = conn.stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

    // Writer task: single consumer of the outbound channel, so messages to
    // this connection keep their order.
    tokio::spawn(async move {
        let mut sink = ws_sink;
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // The id and its sink are registered in one critical section: anything
    // snapshotting state under the router lock after registration must be
    // able to reach this connection.
    let (connection_id, actions) = {
        let mut router = router.lock().await;
        let (connection_id, actions) = router.accept_connection();
        shared.outbound.write().await.insert(connection_id, out_tx);
        (connection_id, actions)
    };

    tracing::debug!("new connection {connection_id} from {peer}");

    execute_actions(actions, &shared).await;

    while let Some(incoming) = ws_stream.next().await {
        match incoming {
            Ok(WsMessage::Text(text)) => {
                let event = RouterEvent::MessageReceived {
                    connection_id,
                    raw: text.to_string(),
                };

                let actions = {
                    let mut router = router.lock().await;
                    match router.process_event(event) {
                        Ok(actions) => actions,
                        Err(e) => {
                            tracing::warn!("message processing error: {e}");
                            continue;
                        },
                    }
                };

                execute_actions(actions, &shared).await;
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {
                // Binary/ping/pong frames are not part of the protocol.
            },
            Err(e) => {
                tracing::debug!("connection {connection_id} read error: {e}");
                break;
            },
        }
    }

    // Teardown: drop the sink first so no further sends can reach this
    // connection, then reconcile registry and room membership in one
    // serialized router event.
    {
        let mut outbound = shared.outbound.write().await;
        outbound.remove(&connection_id);
    }

    let actions = {
        let mut router = router.lock().await;
        router.process_event(RouterEvent::ConnectionClosed { connection_id })?
    };

    execute_actions(actions, &shared).await;

    Ok(())
}

/// Execute router actions against the shared connection state.
async fn execute_actions(actions: Vec<RouterAction>, shared: &SharedState) {
    for action in actions {
        match action {
            RouterAction::SendToConnection { connection_id, message } => {
                let encoded = match message.encode() {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::error!("failed to encode message for {connection_id}: {e}");
                        continue;
                    },
                };

                let outbound = shared.outbound.read().await;
                match outbound.get(&connection_id) {
                    Some(tx) => {
                        if tx.send(WsMessage::Text(encoded.into())).is_err() {
                            tracing::warn!("send to {connection_id} skipped: closed mid-send");
                        }
                    },
                    None => {
                        // Closed before the send was executed; skip silently
                        // rather than failing the surrounding dispatch.
                        tracing::debug!("send to {connection_id} skipped: connection gone");
                    },
                }
            },

            RouterAction::CloseConnection { connection_id, reason } => {
                tracing::info!("closing connection {connection_id}: {reason}");
                let mut outbound = shared.outbound.write().await;
                if let Some(tx) = outbound.remove(&connection_id) {
                    let _ = tx.send(WsMessage::Close(None));
                }
            },

            RouterAction::DeliverToHandler { connection_id, payload, room } => {
                let _ = shared.notifications.send(ServerNotification::Message {
                    connection_id,
                    payload,
                    room,
                });
            },

            RouterAction::NotifyAccepted { connection_id } => {
                let _ = shared
                    .notifications
                    .send(ServerNotification::Connected { connection_id });
            },

            RouterAction::NotifyClosed { connection_id, open_peers } => {
                let _ = shared.notifications.send(ServerNotification::Disconnected {
                    connection_id,
                    open_peers,
                });
            },

            RouterAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}
