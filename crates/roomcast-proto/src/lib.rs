//! Roomcast wire protocol.
//!
//! Message envelope types shared by the server and client crates. The wire
//! format is JSON: control messages (join/leave and the server's structured
//! replies) carry an explicit discriminant marker, everything else is an
//! application message routed by an attached room name.
//!
//! This crate is pure data - no I/O, no async. Classification and
//! encode/decode live in [`Message`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod errors;

pub use envelope::{Control, Message, RoomInfo};
pub use errors::{ProtocolError, Result};
