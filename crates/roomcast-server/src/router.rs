//! Router: classifies inbound messages and dispatches.
//!
//! Sans-IO core of the server. The runtime feeds events ([`RouterEvent`]) in,
//! the router mutates the registry and room directory, and returns actions
//! ([`RouterAction`]) for the runtime to execute. One event is fully handled
//! before the next is accepted, so all registry/directory/membership
//! mutations are serialized by construction.
//!
//! Classification per inbound raw message:
//! - control `joinRoom`/`leaveRoom` mutate room membership and produce a
//!   structured reply to the sender;
//! - anything else is an application message: the routing field is stripped,
//!   the target room resolved, and the payload delivered to the sender's
//!   message hook. Application delivery is deliberately permissive - an
//!   unresolved room still reaches the handler, just without room context,
//!   because only control operations have a client awaiting an
//!   acknowledgement.
//! - a malformed payload fails closed on that single message: dropped and
//!   logged, never fatal to the connection or other state.

use std::fmt;
use std::time::Instant;

use roomcast_proto::{Control, Message, RoomInfo};
use serde_json::Value;

use crate::env::Environment;
use crate::registry::{Connection, ConnectionId, DuplicateIdentity, Registry};
use crate::rooms::{RoomDirectory, RoomId};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the router processes.
///
/// Produced by the external runtime (one per transport event). Connection
/// acceptance goes through [`Router::accept_connection`] instead, because the
/// router owns id generation.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// Raw text received from a connection.
    ///
    /// Parsing happens inside the router so a malformed message is contained
    /// to this one event.
    MessageReceived {
        /// Connection that sent the message.
        connection_id: ConnectionId,
        /// The raw wire text.
        raw: String,
    },

    /// A connection was closed (by peer or transport error).
    ConnectionClosed {
        /// Connection that was closed.
        connection_id: ConnectionId,
    },
}

/// Room context attached to a routed application delivery.
#[derive(Debug, Clone)]
pub struct RoomContext {
    /// The resolved room's id.
    pub id: RoomId,
    /// The resolved room's directory-unique name.
    pub name: String,
    /// Membership snapshot taken at routing time, for consumer fan-out.
    pub members: Vec<ConnectionId>,
}

/// Actions the router produces for the runtime to execute.
#[derive(Debug, Clone)]
pub enum RouterAction {
    /// Send a message to one connection.
    SendToConnection {
        /// Target connection.
        connection_id: ConnectionId,
        /// Message to encode and transmit.
        message: Message,
    },

    /// Close a connection.
    CloseConnection {
        /// Connection to close.
        connection_id: ConnectionId,
        /// Reason for closure.
        reason: String,
    },

    /// Deliver an application payload to the sender's message hook.
    ///
    /// `room` is `Some` when the routing field resolved; delivery happens
    /// either way (permissive policy). Consumers decide further fan-out.
    DeliverToHandler {
        /// The sending connection (delivery target of the hook).
        connection_id: ConnectionId,
        /// User payload with routing metadata stripped.
        payload: Value,
        /// Resolved room context, if any.
        room: Option<RoomContext>,
    },

    /// Notify the embedding process of a newly accepted connection.
    NotifyAccepted {
        /// The new connection.
        connection_id: ConnectionId,
    },

    /// Surface a closed connection together with the pre-removal snapshot
    /// of its open peers.
    NotifyClosed {
        /// The closed connection.
        connection_id: ConnectionId,
        /// Connections still open, snapshotted before the registry mutation.
        open_peers: Vec<ConnectionId>,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

/// Log levels for router actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Errors from router operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// Event referenced a connection that is not registered.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// An operation required a room that does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(String),
}

/// Sans-IO router over single-owner registry and room directory state.
///
/// Both structures are owned here and dependency-injected into nothing else;
/// there are no ambient globals, which keeps the core testable in isolation.
pub struct Router<E: Environment> {
    registry: Registry,
    directory: RoomDirectory,
    env: E,
    config: RouterConfig,
}

impl<E: Environment> Router<E> {
    /// Create a new router.
    pub fn new(env: E, config: RouterConfig) -> Self {
        Self { registry: Registry::new(), directory: RoomDirectory::new(), env, config }
    }

    /// Accept a new connection, generating its identity.
    ///
    /// Ids are server-generated: on the (unlikely) collision with a
    /// still-open id the router regenerates rather than propagating
    /// [`DuplicateIdentity`].
    pub fn accept_connection(&mut self) -> (ConnectionId, Vec<RouterAction>) {
        let now = self.env.now();

        if self.registry.len() >= self.config.max_connections {
            let connection_id = ConnectionId(self.env.random_u64());
            return (connection_id, vec![RouterAction::CloseConnection {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        let connection_id = loop {
            let candidate = ConnectionId(self.env.random_u64());
            match self.registry.register(Connection::new(candidate)) {
                Ok(()) => break candidate,
                Err(DuplicateIdentity(_)) => {},
            }
        };

        (connection_id, vec![
            RouterAction::NotifyAccepted { connection_id },
            RouterAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {connection_id} accepted"),
                timestamp: now,
            },
        ])
    }

    /// Process a router event and return actions to execute.
    ///
    /// This is the main entry point for the router.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConnectionNotFound`] for messages from
    /// connections the registry does not know.
    pub fn process_event(&mut self, event: RouterEvent) -> Result<Vec<RouterAction>, RouterError> {
        match event {
            RouterEvent::MessageReceived { connection_id, raw } => {
                self.handle_message(connection_id, &raw)
            },
            RouterEvent::ConnectionClosed { connection_id } => {
                Ok(self.handle_connection_closed(connection_id))
            },
        }
    }

    /// Create a room; the room-creation factory exposed to the surrounding
    /// process.
    pub fn create_room(&mut self, requested_name: &str) -> (RoomInfo, Vec<RouterAction>) {
        let now = self.env.now();
        let room = self.directory.create_room(requested_name, &self.env);
        let info = RoomInfo { id: room.id().0, name: room.resolved_name().to_string() };

        (info.clone(), vec![RouterAction::Log {
            level: LogLevel::Info,
            message: format!(
                "room '{}' created (requested '{requested_name}', id {})",
                info.name,
                room.id()
            ),
            timestamp: now,
        }])
    }

    /// Broadcast an application payload to every member of a room.
    ///
    /// The membership snapshot is taken synchronously here; callers holding
    /// the router behind a lock therefore get a consistent member list even
    /// if the sends themselves fan out later.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RoomNotFound`] if no room has the given
    /// resolved name.
    pub fn broadcast(
        &self,
        name: &str,
        payload: &Value,
        exclude: Option<ConnectionId>,
    ) -> Result<Vec<RouterAction>, RouterError> {
        let room = self
            .directory
            .find_by_name(name)
            .ok_or_else(|| RouterError::RoomNotFound(name.to_string()))?;

        let message = Message::Application {
            room: Some(room.resolved_name().to_string()),
            payload: payload.clone(),
        };

        Ok(room
            .members()
            .filter(|&member| Some(member) != exclude)
            .map(|member| RouterAction::SendToConnection {
                connection_id: member,
                message: message.clone(),
            })
            .collect())
    }

    fn handle_message(
        &mut self,
        connection_id: ConnectionId,
        raw: &str,
    ) -> Result<Vec<RouterAction>, RouterError> {
        if !self.registry.contains(connection_id) {
            return Err(RouterError::ConnectionNotFound(connection_id));
        }

        let message = match Message::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                // Fail closed on this single message.
                return Ok(vec![RouterAction::Log {
                    level: LogLevel::Warn,
                    message: format!("dropping malformed message from {connection_id}: {e}"),
                    timestamp: self.env.now(),
                }]);
            },
        };

        match message {
            Message::Control(Control::JoinRoom { name }) => {
                Ok(self.handle_join(connection_id, &name))
            },
            Message::Control(Control::LeaveRoom { name }) => {
                Ok(self.handle_leave(connection_id, &name))
            },
            Message::Control(_) => {
                // Server replies are outbound-only; one arriving here is
                // protocol noise from a confused peer.
                Ok(vec![RouterAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "dropping unexpected control reply from {connection_id}"
                    ),
                    timestamp: self.env.now(),
                }])
            },
            Message::Application { room, payload } => {
                Ok(self.handle_application(connection_id, room.as_deref(), payload))
            },
        }
    }

    fn handle_join(&mut self, connection_id: ConnectionId, name: &str) -> Vec<RouterAction> {
        let now = self.env.now();

        if self.directory.is_empty() {
            return vec![
                RouterAction::SendToConnection {
                    connection_id,
                    message: Message::Control(Control::Error {
                        error: "No rooms available".to_string(),
                    }),
                },
                RouterAction::Log {
                    level: LogLevel::Debug,
                    message: format!("join from {connection_id} with no rooms available"),
                    timestamp: now,
                },
            ];
        }

        let Some(room) = self.directory.find_by_name_mut(name) else {
            return vec![
                RouterAction::SendToConnection {
                    connection_id,
                    message: Message::Control(Control::Error {
                        error: "No rooms with that name".to_string(),
                    }),
                },
                RouterAction::Log {
                    level: LogLevel::Debug,
                    message: format!("join from {connection_id} for unknown room '{name}'"),
                    timestamp: now,
                },
            ];
        };

        room.join(connection_id);
        let info = RoomInfo { id: room.id().0, name: room.resolved_name().to_string() };
        let resolved = info.name.clone();

        vec![
            RouterAction::SendToConnection {
                connection_id,
                message: Message::Control(Control::RoomJoined { room: info }),
            },
            RouterAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {connection_id} joined room '{resolved}'"),
                timestamp: now,
            },
        ]
    }

    fn handle_leave(&mut self, connection_id: ConnectionId, name: &str) -> Vec<RouterAction> {
        let now = self.env.now();

        let Some(room) = self.directory.find_by_name_mut(name) else {
            // Leave for a nonexistent room is an explicit no-op.
            return vec![RouterAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "leave from {connection_id} for unknown room '{name}' ignored"
                ),
                timestamp: now,
            }];
        };

        // Idempotent: a second leave removes nothing.
        room.leave(connection_id);
        let clients = room.member_count();
        let resolved = room.resolved_name().to_string();

        vec![
            RouterAction::SendToConnection {
                connection_id,
                message: Message::Control(Control::RoomLeft {
                    name: resolved.clone(),
                    clients,
                }),
            },
            RouterAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "connection {connection_id} left room '{resolved}' ({clients} remain)"
                ),
                timestamp: now,
            },
        ]
    }

    fn handle_application(
        &self,
        connection_id: ConnectionId,
        room: Option<&str>,
        payload: Value,
    ) -> Vec<RouterAction> {
        let context = room
            .and_then(|name| self.directory.find_by_name(name))
            .map(|room| RoomContext {
                id: room.id(),
                name: room.resolved_name().to_string(),
                members: room.members().collect(),
            });

        // Permissive by design: an unresolved room still reaches the
        // sender's handler, just without room context.
        vec![RouterAction::DeliverToHandler { connection_id, payload, room: context }]
    }

    fn handle_connection_closed(&mut self, connection_id: ConnectionId) -> Vec<RouterAction> {
        let now = self.env.now();

        // Pre-removal snapshot feeds the close notification; the registry
        // itself reflects post-removal state.
        let open_peers: Vec<ConnectionId> =
            self.registry.list().filter(|&peer| peer != connection_id).collect();

        if self.registry.unregister(connection_id).is_none() {
            return vec![RouterAction::Log {
                level: LogLevel::Debug,
                message: format!("close for unknown connection {connection_id} ignored"),
                timestamp: now,
            }];
        }

        self.directory.prune_connection(connection_id);

        vec![
            RouterAction::NotifyClosed { connection_id, open_peers },
            RouterAction::Log {
                level: LogLevel::Info,
                message: format!("connection {connection_id} closed"),
                timestamp: now,
            },
        ]
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Read-only view of the room directory.
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }
}

impl<E: Environment> fmt::Debug for Router<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("connection_count", &self.registry.len())
            .field("room_count", &self.directory.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::SystemEnv;

    use super::*;

    fn router() -> Router<SystemEnv> {
        Router::new(SystemEnv::new(), RouterConfig::default())
    }

    fn join_raw(name: &str) -> String {
        format!(r#"{{"control":true,"type":"joinRoom","details":{{"name":"{name}"}}}}"#)
    }

    fn leave_raw(name: &str) -> String {
        format!(r#"{{"control":true,"type":"leaveRoom","details":{{"name":"{name}"}}}}"#)
    }

    fn error_reply(actions: &[RouterAction]) -> Option<String> {
        actions.iter().find_map(|action| match action {
            RouterAction::SendToConnection {
                message: Message::Control(Control::Error { error }),
                ..
            } => Some(error.clone()),
            _ => None,
        })
    }

    #[test]
    fn accept_registers_connection() {
        let mut router = router();

        let (id, actions) = router.accept_connection();

        assert_eq!(router.connection_count(), 1);
        assert!(router.registry().contains(id));
        assert!(matches!(actions[0], RouterAction::NotifyAccepted { connection_id } if connection_id == id));
    }

    #[test]
    fn accept_closes_when_max_connections_exceeded() {
        let mut router = Router::new(SystemEnv::new(), RouterConfig { max_connections: 1 });

        router.accept_connection();
        let (_, actions) = router.accept_connection();

        assert_eq!(router.connection_count(), 1);
        assert!(matches!(actions[0], RouterAction::CloseConnection { .. }));
    }

    #[test]
    fn join_with_empty_directory_reports_no_rooms_available() {
        let mut router = router();
        let (id, _) = router.accept_connection();

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: join_raw("lobby"),
            })
            .unwrap();

        assert_eq!(error_reply(&actions).as_deref(), Some("No rooms available"));
    }

    #[test]
    fn join_unknown_room_reports_no_rooms_with_that_name() {
        let mut router = router();
        let (id, _) = router.accept_connection();
        router.create_room("general");

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: join_raw("lobby"),
            })
            .unwrap();

        assert_eq!(error_reply(&actions).as_deref(), Some("No rooms with that name"));
    }

    #[test]
    fn join_adds_member_and_replies_room_joined() {
        let mut router = router();
        let (id, _) = router.accept_connection();
        let (info, _) = router.create_room("lobby");

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: join_raw("lobby"),
            })
            .unwrap();

        let joined = actions.iter().find_map(|action| match action {
            RouterAction::SendToConnection {
                message: Message::Control(Control::RoomJoined { room }),
                ..
            } => Some(room.clone()),
            _ => None,
        });

        assert_eq!(joined, Some(info));
        assert!(router.directory().find_by_name("lobby").unwrap().is_member(id));
    }

    #[test]
    fn leave_replies_with_post_removal_count() {
        let mut router = router();
        let (a, _) = router.accept_connection();
        let (b, _) = router.accept_connection();
        router.create_room("lobby");

        for id in [a, b] {
            router
                .process_event(RouterEvent::MessageReceived {
                    connection_id: id,
                    raw: join_raw("lobby"),
                })
                .unwrap();
        }

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: a,
                raw: leave_raw("lobby"),
            })
            .unwrap();

        let left = actions.iter().find_map(|action| match action {
            RouterAction::SendToConnection {
                message: Message::Control(Control::RoomLeft { name, clients }),
                ..
            } => Some((name.clone(), *clients)),
            _ => None,
        });

        assert_eq!(left, Some(("lobby".to_string(), 1)));
    }

    #[test]
    fn double_leave_is_a_no_op() {
        let mut router = router();
        let (id, _) = router.accept_connection();
        router.create_room("lobby");

        router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: join_raw("lobby"),
            })
            .unwrap();

        for _ in 0..2 {
            let actions = router
                .process_event(RouterEvent::MessageReceived {
                    connection_id: id,
                    raw: leave_raw("lobby"),
                })
                .unwrap();

            // Both leaves ack with the same post-removal count.
            assert!(actions.iter().any(|action| matches!(
                action,
                RouterAction::SendToConnection {
                    message: Message::Control(Control::RoomLeft { clients: 0, .. }),
                    ..
                }
            )));
        }

        assert_eq!(router.directory().find_by_name("lobby").unwrap().member_count(), 0);
    }

    #[test]
    fn leave_nonexistent_room_is_a_silent_no_op() {
        let mut router = router();
        let (id, _) = router.accept_connection();

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: leave_raw("lobby"),
            })
            .unwrap();

        assert!(
            actions
                .iter()
                .all(|action| matches!(action, RouterAction::Log { .. }))
        );
    }

    #[test]
    fn application_message_delivers_with_room_context() {
        let mut router = router();
        let (id, _) = router.accept_connection();
        router.create_room("lobby");
        router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: join_raw("lobby"),
            })
            .unwrap();

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: r#"{"text":"hi","room":"lobby"}"#.to_string(),
            })
            .unwrap();

        match &actions[0] {
            RouterAction::DeliverToHandler { connection_id, payload, room } => {
                assert_eq!(*connection_id, id);
                assert_eq!(payload, &serde_json::json!({"text": "hi"}));
                let room = room.as_ref().unwrap();
                assert_eq!(room.name, "lobby");
                assert_eq!(room.members, vec![id]);
            },
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn application_message_to_unresolved_room_still_delivers() {
        let mut router = router();
        let (id, _) = router.accept_connection();

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: r#"{"text":"hi","room":"nowhere"}"#.to_string(),
            })
            .unwrap();

        match &actions[0] {
            RouterAction::DeliverToHandler { payload, room, .. } => {
                assert_eq!(payload, &serde_json::json!({"text": "hi"}));
                assert!(room.is_none());
            },
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn malformed_message_is_dropped_without_error() {
        let mut router = router();
        let (id, _) = router.accept_connection();

        let actions = router
            .process_event(RouterEvent::MessageReceived {
                connection_id: id,
                raw: "{not json".to_string(),
            })
            .unwrap();

        assert!(matches!(actions[0], RouterAction::Log { level: LogLevel::Warn, .. }));
        assert_eq!(router.connection_count(), 1);
    }

    #[test]
    fn message_from_unknown_connection_is_an_error() {
        let mut router = router();

        let result = router.process_event(RouterEvent::MessageReceived {
            connection_id: ConnectionId(999),
            raw: join_raw("lobby"),
        });

        assert!(matches!(result, Err(RouterError::ConnectionNotFound(ConnectionId(999)))));
    }

    #[test]
    fn close_prunes_registry_and_all_rooms() {
        let mut router = router();
        let (a, _) = router.accept_connection();
        let (b, _) = router.accept_connection();
        router.create_room("lobby");
        router.create_room("general");

        for name in ["lobby", "general"] {
            router
                .process_event(RouterEvent::MessageReceived {
                    connection_id: a,
                    raw: join_raw(name),
                })
                .unwrap();
        }
        router
            .process_event(RouterEvent::MessageReceived {
                connection_id: b,
                raw: join_raw("lobby"),
            })
            .unwrap();

        let actions = router
            .process_event(RouterEvent::ConnectionClosed { connection_id: a })
            .unwrap();

        // Pre-removal snapshot of the other open peers.
        match &actions[0] {
            RouterAction::NotifyClosed { connection_id, open_peers } => {
                assert_eq!(*connection_id, a);
                assert_eq!(open_peers, &vec![b]);
            },
            other => panic!("expected close notification, got {other:?}"),
        }

        assert!(!router.registry().contains(a));
        assert!(!router.directory().find_by_name("lobby").unwrap().is_member(a));
        assert_eq!(router.directory().find_by_name("general").unwrap().member_count(), 0);
        assert!(router.directory().find_by_name("lobby").unwrap().is_member(b));
    }

    #[test]
    fn close_for_unknown_connection_is_idempotent() {
        let mut router = router();

        let actions = router
            .process_event(RouterEvent::ConnectionClosed { connection_id: ConnectionId(42) })
            .unwrap();

        assert!(matches!(actions[0], RouterAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn broadcast_snapshots_members_and_excludes_sender() {
        let mut router = router();
        let (a, _) = router.accept_connection();
        let (b, _) = router.accept_connection();
        router.create_room("lobby");
        for id in [a, b] {
            router
                .process_event(RouterEvent::MessageReceived {
                    connection_id: id,
                    raw: join_raw("lobby"),
                })
                .unwrap();
        }

        let payload = serde_json::json!({"text": "hi"});
        let actions = router.broadcast("lobby", &payload, Some(a)).unwrap();

        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RouterAction::SendToConnection { connection_id, .. } if *connection_id == b
        ));
    }

    #[test]
    fn broadcast_to_unknown_room_fails() {
        let router = router();

        let payload = serde_json::json!({});
        let result = router.broadcast("nowhere", &payload, None);

        assert!(matches!(result, Err(RouterError::RoomNotFound(_))));
    }

    #[test]
    fn broadcast_never_reaches_closed_connection() {
        let mut router = router();
        let (a, _) = router.accept_connection();
        let (b, _) = router.accept_connection();
        router.create_room("lobby");
        for id in [a, b] {
            router
                .process_event(RouterEvent::MessageReceived {
                    connection_id: id,
                    raw: join_raw("lobby"),
                })
                .unwrap();
        }

        router.process_event(RouterEvent::ConnectionClosed { connection_id: b }).unwrap();

        let payload = serde_json::json!({"text": "hi"});
        let actions = router.broadcast("lobby", &payload, None).unwrap();

        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RouterAction::SendToConnection { connection_id, .. } if *connection_id == a
        ));
    }
}
