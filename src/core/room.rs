use std::collections::{HashMap, HashSet};

use crate::core::connection::ConnectionId;
use crate::core::rate_limiter::{RateLimiter, TokenBucketConfig};

/// A named broadcast domain, in practice the chat channel of one match
#[derive(Debug)]
struct Room {
    /// Opaque room key, the match id
    id: String,
    /// Connections currently in the room
    members: HashSet<ConnectionId>,
    /// Set while the poller has a cached snapshot for this room
    holds_match_state: bool,
    /// Created on the first broadcast, dropped with the room
    limiter: Option<RateLimiter>,
}

impl Room {
    fn new(id: String) -> Self {
        Self {
            id,
            members: HashSet::new(),
            holds_match_state: false,
            limiter: None,
        }
    }

    /// Neither reason for the room to exist applies any more
    fn is_vacant(&self) -> bool {
        self.members.is_empty() && !self.holds_match_state
    }
}

/// Room membership bookkeeping.
///
/// Keeps both directions of the relation (room to members, connection to
/// rooms) consistent. Owned and mutated exclusively by the hub loop, so it
/// carries no locks of its own.
#[derive(Debug)]
pub struct RoomIndex {
    rooms: HashMap<String, Room>,
    connection_rooms: HashMap<ConnectionId, HashSet<String>>,
    room_limit: TokenBucketConfig,
}

impl RoomIndex {
    pub fn new(room_limit: TokenBucketConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            connection_rooms: HashMap::new(),
            room_limit,
        }
    }

    /// Add a connection to a room, creating the room on first join.
    /// Returns false if the connection was already a member.
    pub fn join(&mut self, connection: ConnectionId, room_id: &str) -> bool {
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()));
        let added = room.members.insert(connection);

        self.connection_rooms
            .entry(connection)
            .or_default()
            .insert(room_id.to_string());

        added
    }

    /// Remove a connection from a room. The room entry is dropped once it has
    /// no members and no cached match state.
    pub fn leave(&mut self, connection: ConnectionId, room_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(room) => {
                let removed = room.members.remove(&connection);
                if room.is_vacant() {
                    self.rooms.remove(room_id);
                }
                removed
            }
            None => false,
        };

        if let Some(rooms) = self.connection_rooms.get_mut(&connection) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.connection_rooms.remove(&connection);
            }
        }

        removed
    }

    /// Remove a connection from every room it belongs to, returning those rooms
    pub fn leave_all(&mut self, connection: ConnectionId) -> Vec<String> {
        let rooms: Vec<String> = self
            .connection_rooms
            .get(&connection)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();

        for room_id in &rooms {
            self.leave(connection, room_id);
        }

        rooms
    }

    /// Members of a room, empty when the room does not exist
    pub fn members_of<'a>(&'a self, room_id: &str) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.rooms
            .get(room_id)
            .into_iter()
            .flat_map(|room| room.members.iter())
    }

    /// Keep the room alive because a match snapshot is cached for it
    pub fn retain_match_state(&mut self, room_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()))
            .holds_match_state = true;
    }

    /// Room-scoped admission. `None` when the room does not exist.
    pub fn allow(&mut self, room_id: &str) -> Option<bool> {
        let limit = self.room_limit;
        let room = self.rooms.get_mut(room_id)?;
        Some(
            room.limiter
                .get_or_insert_with(|| RateLimiter::new(limit))
                .allow(),
        )
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Both directions of the membership relation agree
    pub fn is_consistent(&self) -> bool {
        let forward = self.rooms.values().all(|room| {
            room.members.iter().all(|member| {
                self.connection_rooms
                    .get(member)
                    .is_some_and(|rooms| rooms.contains(&room.id))
            })
        });
        let backward = self.connection_rooms.iter().all(|(connection, rooms)| {
            rooms.iter().all(|room_id| {
                self.rooms
                    .get(room_id)
                    .is_some_and(|room| room.members.contains(connection))
            })
        });
        let no_vacant_rooms = self.rooms.values().all(|room| !room.is_vacant());

        forward && backward && no_vacant_rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    impl RoomIndex {
        fn contains_room(&self, room_id: &str) -> bool {
            self.rooms.contains_key(room_id)
        }

        fn member_count(&self, room_id: &str) -> usize {
            self.rooms.get(room_id).map_or(0, |room| room.members.len())
        }

        fn rooms_of(&self, connection: &ConnectionId) -> Vec<String> {
            self.connection_rooms
                .get(connection)
                .map(|rooms| rooms.iter().cloned().collect())
                .unwrap_or_default()
        }
    }

    fn index() -> RoomIndex {
        RoomIndex::new(TokenBucketConfig::new(10.0, 2))
    }

    #[test]
    fn test_join_creates_room_lazily() {
        let mut index = index();
        let conn = Uuid::new_v4();

        assert!(!index.contains_room("m1"));
        assert!(index.join(conn, "m1"));
        assert!(!index.join(conn, "m1"));
        assert!(index.contains_room("m1"));
        assert_eq!(index.members_of("m1").count(), 1);
        assert_eq!(index.rooms_of(&conn), vec!["m1".to_string()]);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_last_leave_removes_room() {
        let mut index = index();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.join(a, "m1");
        index.join(b, "m1");

        assert!(index.leave(a, "m1"));
        assert!(index.contains_room("m1"));
        assert!(index.leave(b, "m1"));
        assert!(!index.contains_room("m1"));
        assert!(!index.leave(b, "m1"));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_match_state_keeps_empty_room() {
        let mut index = index();
        let conn = Uuid::new_v4();
        index.join(conn, "m1");
        index.retain_match_state("m1");

        index.leave(conn, "m1");
        assert!(index.contains_room("m1"));
        assert_eq!(index.member_count("m1"), 0);
        assert!(index.is_consistent());

        // Rejoining the retained room keeps its limiter state
        assert_eq!(index.allow("m1"), Some(true));
        index.join(conn, "m1");
        assert_eq!(index.allow("m1"), Some(true));
        assert_eq!(index.allow("m1"), Some(false));
    }

    #[test]
    fn test_room_limiter_lives_with_room() {
        let mut index = index();
        let conn = Uuid::new_v4();
        index.join(conn, "m1");

        assert_eq!(index.allow("m1"), Some(true));
        assert_eq!(index.allow("m1"), Some(true));
        assert_eq!(index.allow("m1"), Some(false));
        assert_eq!(index.allow("m2"), None);

        // Rejoining after removal starts from a fresh bucket
        index.leave(conn, "m1");
        index.join(conn, "m1");
        assert_eq!(index.allow("m1"), Some(true));
    }

    #[test]
    fn test_leave_all_keeps_index_consistent() {
        let mut index = index();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for room in ["m1", "m2", "m3"] {
            index.join(a, room);
        }
        index.join(b, "m2");

        let mut left = index.leave_all(a);
        left.sort();
        assert_eq!(left, vec!["m1", "m2", "m3"]);
        assert!(index.rooms_of(&a).is_empty());
        assert_eq!(index.room_count(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_interleaved_operations_hold_invariant() {
        let mut index = index();
        let conns: Vec<_> = (0..5).map(|_| Uuid::new_v4()).collect();
        let rooms = ["a", "b", "c"];

        // Deterministic pseudo-random walk over join/leave/match-state operations
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let conn = conns[(seed % 5) as usize];
            let room = rooms[((seed >> 8) % 3) as usize];
            match (seed >> 16) % 4 {
                0 | 1 => {
                    index.join(conn, room);
                }
                2 => {
                    index.leave(conn, room);
                }
                _ => {
                    if (seed >> 24) % 2 == 0 {
                        index.retain_match_state(room);
                    } else {
                        index.leave_all(conn);
                    }
                }
            }
            assert!(index.is_consistent());
        }
    }
}
