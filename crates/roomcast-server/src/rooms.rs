//! Rooms and the room directory.
//!
//! A room is a named group of connections sharing application-message
//! delivery. Rooms are created explicitly (no lazy creation on join) and are
//! never destroyed, even at zero members - they persist for the life of the
//! server process.
//!
//! # Name collision policy
//!
//! Each room keeps the name its creator requested and a resolved name that is
//! unique within the directory. If no prior room shares the requested name,
//! the resolved name is the requested name verbatim; otherwise `-N` is
//! appended, where N starts at the count of previously created rooms with
//! that same requested name (first collision gets `-1`). Creation order is
//! deterministic, so the suffix sequence is too.
//!
//! Candidates are checked against the full set of *resolved* names, so a
//! caller explicitly requesting an already-suffixed name (e.g. `"lobby-1"`)
//! never collides with an auto-suffixed one - the suffix skips ahead instead.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::env::Environment;
use crate::registry::ConnectionId;

/// Unique, immutable room identity, generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Named group of connections sharing application-message delivery.
///
/// Rooms reference connections by id and do not own them; membership is
/// pruned by the router when a connection closes.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    requested_name: String,
    resolved_name: String,
    members: HashSet<ConnectionId>,
}

impl Room {
    /// The room's immutable identity.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// The name the creator asked for.
    pub fn requested_name(&self) -> &str {
        &self.requested_name
    }

    /// The directory-unique resolved name.
    pub fn resolved_name(&self) -> &str {
        &self.resolved_name
    }

    /// Current members.
    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.iter().copied()
    }

    /// Number of current members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the given connection is a member.
    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    /// Add a member. Returns `false` if it was already present.
    pub(crate) fn join(&mut self, id: ConnectionId) -> bool {
        self.members.insert(id)
    }

    /// Remove a member. Idempotent: returns `false` if it was absent.
    pub(crate) fn leave(&mut self, id: ConnectionId) -> bool {
        self.members.remove(&id)
    }
}

/// Directory of all rooms, keyed by resolved name.
///
/// Rooms live in creation order (a `Vec`) because that order drives the
/// collision suffix; the name index maps resolved names to positions.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
    by_name: HashMap<String, usize>,
}

impl RoomDirectory {
    /// Create a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room, resolving a collision-free name per the suffix policy.
    pub fn create_room(&mut self, requested_name: &str, env: &impl Environment) -> &Room {
        let mut suffix =
            self.rooms.iter().filter(|r| r.requested_name == requested_name).count();
        let mut resolved_name = if suffix == 0 {
            requested_name.to_string()
        } else {
            format!("{requested_name}-{suffix}")
        };

        // An explicitly requested name may already occupy the candidate
        // (e.g. a caller asked for "lobby-1" before); skip ahead until free.
        while self.by_name.contains_key(&resolved_name) {
            suffix += 1;
            resolved_name = format!("{requested_name}-{suffix}");
        }

        let room = Room {
            id: RoomId(env.random_u64()),
            requested_name: requested_name.to_string(),
            resolved_name: resolved_name.clone(),
            members: HashSet::new(),
        };

        let index = self.rooms.len();
        self.rooms.push(room);
        self.by_name.insert(resolved_name, index);

        &self.rooms[index]
    }

    /// Look up a room by its resolved name.
    pub fn find_by_name(&self, name: &str) -> Option<&Room> {
        self.by_name.get(name).map(|&index| &self.rooms[index])
    }

    /// Mutable lookup by resolved name (join/leave paths).
    pub(crate) fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Room> {
        let index = *self.by_name.get(name)?;
        self.rooms.get_mut(index)
    }

    /// Lazy snapshot of all rooms, in creation order.
    pub fn all(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    /// Number of rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms exist.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Close-time reconciliation: drop a connection from every member set.
    pub fn prune_connection(&mut self, id: ConnectionId) {
        for room in &mut self.rooms {
            room.leave(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::SystemEnv;

    use super::*;

    #[test]
    fn first_room_keeps_requested_name() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();

        let room = directory.create_room("lobby", &env);

        assert_eq!(room.requested_name(), "lobby");
        assert_eq!(room.resolved_name(), "lobby");
    }

    #[test]
    fn colliding_names_get_deterministic_suffixes() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();

        let names: Vec<String> = (0..4)
            .map(|_| directory.create_room("lobby", &env).resolved_name().to_string())
            .collect();

        assert_eq!(names, vec!["lobby", "lobby-1", "lobby-2", "lobby-3"]);
    }

    #[test]
    fn suffix_counts_are_per_requested_name() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();

        directory.create_room("lobby", &env);
        directory.create_room("general", &env);
        let second_lobby = directory.create_room("lobby", &env).resolved_name().to_string();
        let second_general =
            directory.create_room("general", &env).resolved_name().to_string();

        assert_eq!(second_lobby, "lobby-1");
        assert_eq!(second_general, "general-1");
    }

    #[test]
    fn explicitly_suffixed_request_never_collides_with_auto_suffix() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();

        directory.create_room("lobby", &env);
        directory.create_room("lobby-1", &env);

        // The auto-suffix candidate "lobby-1" is taken; skip to "lobby-2".
        let auto = directory.create_room("lobby", &env).resolved_name().to_string();

        assert_eq!(auto, "lobby-2");
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn find_by_name_uses_resolved_names() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();

        directory.create_room("lobby", &env);
        let suffixed = directory.create_room("lobby", &env).id();

        assert!(directory.find_by_name("lobby").is_some());
        assert_eq!(directory.find_by_name("lobby-1").map(Room::id), Some(suffixed));
        assert!(directory.find_by_name("lobby-2").is_none());
    }

    #[test]
    fn membership_join_and_leave() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();
        directory.create_room("lobby", &env);

        let room = directory.find_by_name_mut("lobby").unwrap();
        let id = ConnectionId(7);

        assert!(room.join(id));
        assert!(!room.join(id)); // already a member
        assert!(room.is_member(id));
        assert_eq!(room.member_count(), 1);

        assert!(room.leave(id));
        assert!(!room.leave(id)); // second leave is a no-op
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn prune_connection_clears_every_member_set() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();
        directory.create_room("lobby", &env);
        directory.create_room("general", &env);

        let id = ConnectionId(7);
        let other = ConnectionId(8);
        directory.find_by_name_mut("lobby").unwrap().join(id);
        directory.find_by_name_mut("lobby").unwrap().join(other);
        directory.find_by_name_mut("general").unwrap().join(id);

        directory.prune_connection(id);

        assert!(!directory.find_by_name("lobby").unwrap().is_member(id));
        assert!(directory.find_by_name("lobby").unwrap().is_member(other));
        assert_eq!(directory.find_by_name("general").unwrap().member_count(), 0);
    }

    #[test]
    fn rooms_persist_at_zero_members() {
        let env = SystemEnv::new();
        let mut directory = RoomDirectory::new();
        directory.create_room("lobby", &env);

        let id = ConnectionId(7);
        directory.find_by_name_mut("lobby").unwrap().join(id);
        directory.find_by_name_mut("lobby").unwrap().leave(id);

        assert!(directory.find_by_name("lobby").is_some());
        assert_eq!(directory.len(), 1);
    }
}
