//! Client error types.

use roomcast_proto::ProtocolError;

/// Errors that can occur on the client side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Connecting to the server failed (invalid URL, refused, handshake).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection closed while an operation was pending.
    #[error("connection closed")]
    Closed,

    /// The server rejected an operation with a structured `Error` reply.
    #[error("server error: {0}")]
    Server(String),

    /// Wire-level protocol failure.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Server(message) => Self::Server(message),
            other => Self::Protocol(other),
        }
    }
}
