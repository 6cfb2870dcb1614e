//! Sans-IO client state machine.

use std::collections::HashMap;

use roomcast_proto::{Control, Message, RoomInfo};

use crate::event::{ClientAction, ClientEvent};

/// Peer-side state machine mirroring the server's room membership.
///
/// Holds only the local joined-room list; all authoritative state lives on
/// the server. Joins are recorded when the server's `roomJoined` reply
/// arrives, leaves are recorded immediately on request (fire-and-forget,
/// matching the protocol's leave semantics).
#[derive(Debug, Default)]
pub struct Client {
    /// Joined rooms, keyed by resolved name.
    rooms: HashMap<String, RoomInfo>,
}

impl Client {
    /// Create a new client with an empty joined-room list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooms currently in the local joined list.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomInfo> {
        self.rooms.values()
    }

    /// Whether the given resolved room name is in the local joined list.
    pub fn is_joined(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Process a client event and return actions to execute.
    pub fn process_event(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match event {
            ClientEvent::MessageReceived(raw) => self.handle_server_message(&raw),
            ClientEvent::JoinRoom { name } => {
                Self::transmit(Message::Control(Control::JoinRoom { name }))
            },
            ClientEvent::LeaveRoom { name } => {
                // Local list removal is immediate; the ack arrives later.
                self.rooms.remove(&name);
                Self::transmit(Message::Control(Control::LeaveRoom { name }))
            },
            ClientEvent::SendMessage { room, payload } => {
                Self::transmit(Message::Application { room: Some(room), payload })
            },
        }
    }

    fn transmit(message: Message) -> Vec<ClientAction> {
        match message.encode() {
            Ok(encoded) => vec![ClientAction::Send(encoded)],
            Err(e) => vec![ClientAction::Failed(e)],
        }
    }

    fn handle_server_message(&mut self, raw: &str) -> Vec<ClientAction> {
        let Ok(message) = Message::decode(raw) else {
            // Malformed server data is dropped, same fail-closed policy as
            // the server's router.
            return Vec::new();
        };

        match message {
            Message::Control(Control::RoomJoined { room }) => {
                self.rooms.insert(room.name.clone(), room.clone());
                vec![ClientAction::Joined(room)]
            },
            Message::Control(Control::RoomLeft { name, clients }) => {
                vec![ClientAction::Left { name, clients }]
            },
            Message::Control(Control::Error { error }) => {
                vec![ClientAction::Failed(roomcast_proto::ProtocolError::Server(error))]
            },
            Message::Control(_) => {
                // Join/leave requests are client-to-server only.
                Vec::new()
            },
            Message::Application { room, payload } => {
                vec![ClientAction::Deliver { room, payload }]
            },
        }
    }
}
