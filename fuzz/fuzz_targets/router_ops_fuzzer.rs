//! Fuzz target for router event processing
//!
//! # Strategy
//!
//! - Arbitrary op interleavings: accepts, joins, leaves, closes, broadcasts
//! - Raw wire input: arbitrary strings fed straight into message handling
//! - Hostile room names: arbitrary strings, including ones that collide with
//!   the auto-suffix scheme
//!
//! # Invariants
//!
//! - Messages from open connections are always accepted, messages from
//!   closed or unknown connections always rejected
//! - Close is idempotent and never fails
//! - Broadcast to an existing room never fails
//! - Open-connection count always matches a reference model
//! - NEVER panic on any op sequence

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomcast_proto::{Control, Message};
use roomcast_server::{ConnectionId, Router, RouterConfig, RouterEvent, SystemEnv};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    room_names: Vec<String>,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Accept,
    Join { conn: u8, room: u8 },
    Leave { conn: u8, room: u8 },
    RawMessage { conn: u8, raw: String },
    Close { conn: u8 },
    Broadcast { room: u8 },
}

fn pick<T: Clone>(items: &[T], index: u8) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[index as usize % items.len()].clone())
    }
}

fuzz_target!(|scenario: Scenario| {
    let mut router = Router::new(SystemEnv::new(), RouterConfig::default());

    let mut ids: Vec<ConnectionId> = Vec::new();
    let mut open: HashSet<ConnectionId> = HashSet::new();

    let rooms: Vec<String> = scenario
        .room_names
        .iter()
        .take(8)
        .map(|name| router.create_room(name).0.name)
        .collect();

    for op in scenario.ops.into_iter().take(256) {
        match op {
            Op::Accept => {
                let (id, _) = router.accept_connection();
                ids.push(id);
                open.insert(id);
            }

            Op::Join { conn, room } => {
                let (Some(id), Some(name)) = (pick(&ids, conn), pick(&rooms, room)) else {
                    continue;
                };
                let raw = Message::Control(Control::JoinRoom { name }).encode().unwrap();
                let result =
                    router.process_event(RouterEvent::MessageReceived { connection_id: id, raw });
                assert_eq!(result.is_ok(), open.contains(&id));
            }

            Op::Leave { conn, room } => {
                let (Some(id), Some(name)) = (pick(&ids, conn), pick(&rooms, room)) else {
                    continue;
                };
                let raw = Message::Control(Control::LeaveRoom { name }).encode().unwrap();
                let result =
                    router.process_event(RouterEvent::MessageReceived { connection_id: id, raw });
                assert_eq!(result.is_ok(), open.contains(&id));
            }

            Op::RawMessage { conn, raw } => {
                let Some(id) = pick(&ids, conn) else {
                    continue;
                };
                let result =
                    router.process_event(RouterEvent::MessageReceived { connection_id: id, raw });
                assert_eq!(result.is_ok(), open.contains(&id));
            }

            Op::Close { conn } => {
                let Some(id) = pick(&ids, conn) else {
                    continue;
                };
                // Idempotent: closing twice must also succeed.
                router
                    .process_event(RouterEvent::ConnectionClosed { connection_id: id })
                    .unwrap();
                open.remove(&id);
            }

            Op::Broadcast { room } => {
                let Some(name) = pick(&rooms, room) else {
                    continue;
                };
                router
                    .broadcast(&name, &serde_json::json!({"tick": 1}), None)
                    .unwrap();
            }
        }

        assert_eq!(router.connection_count(), open.len());
    }
});
