//! Client events and actions.

use roomcast_proto::{ProtocolError, RoomInfo};
use serde_json::Value;

/// Events the caller feeds into the client.
///
/// The caller is responsible for receiving raw text from the transport and
/// forwarding application intents (join, leave, send).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Raw text received from the server.
    MessageReceived(String),

    /// Application wants to join a room.
    JoinRoom {
        /// Resolved room name to join.
        name: String,
    },

    /// Application wants to leave a room.
    ///
    /// The room is removed from the local joined-room list immediately; the
    /// server's `roomLeft` acknowledgement is surfaced separately.
    LeaveRoom {
        /// Resolved room name to leave.
        name: String,
    },

    /// Application wants to send a payload to a room.
    SendMessage {
        /// Target room name, attached as the routing field.
        room: String,
        /// User payload.
        payload: Value,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Encoded wire text to transmit to the server.
    Send(String),

    /// A join was acknowledged; the room is now in the local joined list.
    Joined(RoomInfo),

    /// A leave was acknowledged by the server.
    Left {
        /// Resolved name of the room that was left.
        name: String,
        /// Member count after removal, as reported by the server.
        clients: usize,
    },

    /// Application payload delivered from the server.
    Deliver {
        /// Room the payload was routed through, if any.
        room: Option<String>,
        /// The user payload.
        payload: Value,
    },

    /// The server signaled a protocol failure.
    ///
    /// Surfaced to the caller instead of corrupting protocol state.
    Failed(ProtocolError),
}
