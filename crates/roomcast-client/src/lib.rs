//! Roomcast client.
//!
//! Peer-side mirror of the server's room state: join/leave rooms and send
//! application payloads to them without holding any server-side state beyond
//! a local joined-room list.
//!
//! # Architecture
//!
//! The [`Client`] is a Sans-IO state machine, mirroring the server's router:
//! it receives events ([`ClientEvent`]), updates the local joined-room list,
//! and returns actions ([`ClientAction`]) for the caller to execute. Server
//! `Error` replies surface as a signaled failure ([`ClientAction::Failed`])
//! rather than corrupting protocol state.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: client with WebSocket transport
//! - [`transport::RoomSession`]: bound room handle with `send`/`leave` and a
//!   message hook scoped to that room

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use roomcast_proto::{ProtocolError, RoomInfo};
