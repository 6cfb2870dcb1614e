//! Server error types.

use std::fmt;

use crate::router::RouterError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// The only process-fatal class: it prevents server startup. Fix
    /// configuration and restart.
    Config(String),

    /// Transport/network error (accept failure, handshake failure, I/O).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    Transport(String),

    /// Protocol error (reply encoding failure, unexpected wire data).
    ///
    /// Fatal for that message or connection at most; the server keeps
    /// serving other clients.
    Protocol(String),

    /// Internal error (unexpected state, logic bug).
    ///
    /// Should never happen in a correct implementation.
    Internal(String),

    /// Router error (from core event processing).
    Router(RouterError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Router(err) => write!(f, "router error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Router(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RouterError> for ServerError {
    fn from(err: RouterError) -> Self {
        Self::Router(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
