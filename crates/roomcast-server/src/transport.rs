//! WebSocket transport.
//!
//! Production transport using `tokio-tungstenite`. The transport only
//! establishes the duplex channel - connection identity, routing, and
//! lifecycle reconciliation all live in the router.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async};

use crate::error::ServerError;

/// WebSocket listener bound to a TCP address.
pub struct WsTransport {
    listener: TcpListener,
}

impl WsTransport {
    /// Create and bind a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an unparseable bind address (the
    /// only process-fatal error class) and [`ServerError::Transport`] if the
    /// listener cannot bind.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {addr}");

        Ok(Self { listener })
    }

    /// Accept and handshake one incoming connection.
    pub async fn accept(&self) -> Result<WsConnection, ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        let stream = accept_async(stream)
            .await
            .map_err(|e| ServerError::Transport(format!("websocket handshake failed: {e}")))?;

        Ok(WsConnection { stream, peer })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// One accepted WebSocket connection.
pub struct WsConnection {
    pub(crate) stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
}

impl WsConnection {
    /// Peer address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
