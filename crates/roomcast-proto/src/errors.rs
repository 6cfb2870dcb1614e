//! Protocol error types.

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors arising from wire-level message handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Message could not be parsed as the expected JSON envelope.
    ///
    /// Never fatal: the router drops the offending message and keeps
    /// serving the connection.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The server reported a failure via a structured `Error` reply.
    ///
    /// Surfaced to the peer-side caller as a signaled failure rather than
    /// corrupting protocol state.
    #[error("server error: {0}")]
    Server(String),
}
