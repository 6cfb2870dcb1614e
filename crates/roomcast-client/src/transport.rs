//! WebSocket transport for the client.
//!
//! Provides [`ConnectedClient`], which handles WebSocket I/O around the
//! Sans-IO [`Client`] state machine, and [`RoomSession`], the bound room
//! handle returned by a successful join. This is a thin layer: protocol
//! logic stays in [`Client`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use roomcast_proto::{ProtocolError, RoomInfo};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::client::Client;
use crate::error::ClientError;
use crate::event::{ClientAction, ClientEvent};

/// State shared between the caller-facing handles and the reader task.
#[derive(Debug)]
struct ClientShared {
    /// The Sans-IO state machine.
    state: Mutex<Client>,
    /// Outbound wire text, drained by the writer task.
    to_server: mpsc::UnboundedSender<String>,
    /// Callers awaiting a join acknowledgement, in transmission order.
    ///
    /// Joins are the only operations awaiting a structured reply, and the
    /// server answers them in wire order on this single connection. Waiter
    /// registration and the wire send happen under this lock, so queue
    /// order always equals wire order.
    pending_joins: Mutex<VecDeque<oneshot::Sender<Result<RoomInfo, ClientError>>>>,
    /// Per-room message hooks, keyed by resolved room name.
    subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    /// Everything not consumed by a pending join or a room subscriber.
    events: mpsc::UnboundedSender<ClientAction>,
}

/// Handle to a connected client with WebSocket transport.
pub struct ConnectedClient {
    shared: Arc<ClientShared>,
    events: mpsc::UnboundedReceiver<ClientAction>,
    reader: tokio::task::AbortHandle,
    writer: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Join a room by name, awaiting the server's acknowledgement.
    ///
    /// On success returns a [`RoomSession`] bound to the resolved room.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Server`] if the server rejects the join
    /// - [`ClientError::Closed`] if the connection drops before the reply
    pub async fn join_room(&self, name: &str) -> Result<RoomSession, ClientError> {
        if self.shared.to_server.is_closed() {
            return Err(ClientError::Closed);
        }

        let (tx, rx) = oneshot::channel();

        // Waiter registration and the wire send must be one atomic step:
        // concurrent joins that interleave between the two would desync the
        // waiter queue from wire order and bind callers to the wrong rooms.
        {
            let mut pending = self.shared.pending_joins.lock().await;

            let actions = {
                let mut state = self.shared.state.lock().await;
                state.process_event(ClientEvent::JoinRoom { name: name.to_string() })
            };

            for action in actions {
                match action {
                    ClientAction::Send(encoded) => {
                        if self.shared.to_server.send(encoded).is_err() {
                            return Err(ClientError::Closed);
                        }
                    },
                    ClientAction::Failed(err) => return Err(err.into()),
                    other => {
                        let _ = self.shared.events.send(other);
                    },
                }
            }

            pending.push_back(tx);
        }

        let info = rx.await.map_err(|_| ClientError::Closed)??;

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().await.insert(info.name.clone(), message_tx);

        Ok(RoomSession { info, shared: Arc::clone(&self.shared), messages: message_rx })
    }

    /// Next event not scoped to a room session (leave acks, unrouted
    /// deliveries, out-of-band failures).
    pub async fn next_event(&mut self) -> Option<ClientAction> {
        self.events.recv().await
    }

    /// Whether the given resolved room name is in the local joined list.
    pub async fn is_joined(&self, name: &str) -> bool {
        self.shared.state.lock().await.is_joined(name)
    }

    /// End the connection.
    pub fn close(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// A joined room, bound to its resolved id and name.
///
/// Dropping the session does not leave the room; call
/// [`RoomSession::leave`].
#[derive(Debug)]
pub struct RoomSession {
    info: RoomInfo,
    shared: Arc<ClientShared>,
    messages: mpsc::UnboundedReceiver<Value>,
}

impl RoomSession {
    /// The resolved room identity.
    pub fn info(&self) -> &RoomInfo {
        &self.info
    }

    /// The resolved room name this session is bound to.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Send an application payload to the bound room.
    ///
    /// The room name is attached as the routing field and stripped again
    /// server-side before the payload reaches any handler.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the connection has ended.
    pub async fn send(&self, payload: Value) -> Result<(), ClientError> {
        if self.shared.to_server.is_closed() {
            return Err(ClientError::Closed);
        }

        let actions = {
            let mut state = self.shared.state.lock().await;
            state.process_event(ClientEvent::SendMessage {
                room: self.info.name.clone(),
                payload,
            })
        };
        dispatch_actions(actions, &self.shared).await;

        Ok(())
    }

    /// Next payload routed to this room.
    pub async fn recv(&mut self) -> Option<Value> {
        self.messages.recv().await
    }

    /// Leave the bound room.
    ///
    /// The room leaves the local joined list immediately; the server's
    /// `roomLeft` acknowledgement arrives later via
    /// [`ConnectedClient::next_event`].
    pub async fn leave(self) -> Result<(), ClientError> {
        self.shared.subscribers.lock().await.remove(&self.info.name);

        let actions = {
            let mut state = self.shared.state.lock().await;
            state.process_event(ClientEvent::LeaveRoom { name: self.info.name.clone() })
        };
        dispatch_actions(actions, &self.shared).await;

        Ok(())
    }
}

/// Connect to a Roomcast server over WebSocket.
///
/// Spawns a reader and a writer task bridging the state machine to the
/// socket.
///
/// # Errors
///
/// Returns [`ClientError::Connection`] if the URL is invalid or the
/// handshake fails. An invalid URL is a construction error, caught here at
/// setup time.
pub async fn connect(url: &str) -> Result<ConnectedClient, ClientError> {
    let (ws, _response) =
        connect_async(url).await.map_err(|e| ClientError::Connection(e.to_string()))?;

    let (mut sink, mut stream) = ws.split();
    let (to_server_tx, mut to_server_rx) = mpsc::unbounded_channel::<String>();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let shared = Arc::new(ClientShared {
        state: Mutex::new(Client::new()),
        to_server: to_server_tx,
        pending_joins: Mutex::new(VecDeque::new()),
        subscribers: Mutex::new(HashMap::new()),
        events: events_tx,
    });

    let writer = tokio::spawn(async move {
        while let Some(text) = to_server_rx.recv().await {
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_shared = Arc::clone(&shared);
    let reader = tokio::spawn(async move {
        while let Some(incoming) = stream.next().await {
            match incoming {
                Ok(WsMessage::Text(text)) => {
                    let actions = {
                        let mut state = reader_shared.state.lock().await;
                        state.process_event(ClientEvent::MessageReceived(text.to_string()))
                    };
                    dispatch_actions(actions, &reader_shared).await;
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {},
                Err(_) => break,
            }
        }

        // Fail any still-pending joins so callers do not hang.
        let mut pending = reader_shared.pending_joins.lock().await;
        while let Some(tx) = pending.pop_front() {
            let _ = tx.send(Err(ClientError::Closed));
        }
    });

    Ok(ConnectedClient {
        shared,
        events: events_rx,
        reader: reader.abort_handle(),
        writer: writer.abort_handle(),
    })
}

/// Route state machine actions to transport, pending joins, room
/// subscribers, or the event channel.
async fn dispatch_actions(actions: Vec<ClientAction>, shared: &ClientShared) {
    for action in actions {
        match action {
            ClientAction::Send(encoded) => {
                let _ = shared.to_server.send(encoded);
            },

            ClientAction::Joined(info) => {
                let waiter = shared.pending_joins.lock().await.pop_front();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(info));
                    },
                    None => {
                        let _ = shared.events.send(ClientAction::Joined(info));
                    },
                }
            },

            ClientAction::Failed(ProtocolError::Server(error)) => {
                // Only joins await a structured reply, so a server error
                // resolves the oldest pending join when one exists.
                let waiter = shared.pending_joins.lock().await.pop_front();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Err(ClientError::Server(error)));
                    },
                    None => {
                        let _ = shared
                            .events
                            .send(ClientAction::Failed(ProtocolError::Server(error)));
                    },
                }
            },

            ClientAction::Deliver { room, payload } => {
                if let Some(name) = room.as_deref() {
                    let subscribers = shared.subscribers.lock().await;
                    if let Some(tx) = subscribers.get(name) {
                        if tx.send(payload.clone()).is_ok() {
                            continue;
                        }
                    }
                }
                let _ = shared.events.send(ClientAction::Deliver { room, payload });
            },

            other => {
                let _ = shared.events.send(other);
            },
        }
    }
}
