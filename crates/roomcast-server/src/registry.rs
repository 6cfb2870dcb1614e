//! Connection registry: the process-wide set of open connections.
//!
//! The registry tracks identity and lifecycle state only. The transport
//! handle for each connection is owned by the runtime layer, which keeps a
//! `ConnectionId -> outbound sink` map; the Sans-IO core never touches
//! sockets.
//!
//! Ids are server-generated at accept time. Reuse of an id after its
//! connection closed is permitted, but a registration colliding with a
//! still-open id fails with [`DuplicateIdentity`] so the caller can
//! regenerate.

use std::collections::HashMap;
use std::fmt;

/// Unique identity of one live connection.
///
/// Stable for the connection's lifetime, unique among currently-open
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport channel is live.
    Open,
    /// The transport channel has closed; the connection is being torn down.
    Closed,
}

/// One duplex transport session with a peer, as seen by the core.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
}

impl Connection {
    /// Create a new open connection with the given identity.
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        Self { id, state: ConnectionState::Open }
    }

    /// The connection's identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

/// Registration collided with a still-open connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("duplicate connection identity: {0}")]
pub struct DuplicateIdentity(pub ConnectionId);

/// Process-wide set of currently open connections, keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly-accepted connection.
    ///
    /// # Errors
    ///
    /// Fails with [`DuplicateIdentity`] if the id collides with an existing
    /// open connection. Ids are server-generated, so the caller's policy is
    /// to regenerate rather than propagate.
    pub fn register(&mut self, connection: Connection) -> Result<(), DuplicateIdentity> {
        if self.connections.contains_key(&connection.id()) {
            return Err(DuplicateIdentity(connection.id()));
        }

        self.connections.insert(connection.id(), connection);
        Ok(())
    }

    /// Remove a connection.
    ///
    /// Idempotent: unregistering an already-absent id is a no-op, not an
    /// error. Returns the connection (now marked closed) if it was present.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let mut connection = self.connections.remove(&id)?;
        connection.close();
        Some(connection)
    }

    /// Whether the given id belongs to a currently open connection.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Lazy, finite, restartable snapshot of currently open connection ids.
    ///
    /// Used for close-time reconciliation and the "who else is connected"
    /// notification.
    pub fn list(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
