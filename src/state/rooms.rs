use std::fmt;

use indexmap::IndexSet;
use serde::{Serialize, Serializer};

use crate::state::registry::SessionId;

/// Identifier of a difficulty room.
///
/// Rooms are addressed on the wire by their decimal string form; in some
/// transports a bare integer zero is indistinguishable from "all
/// connections", so the raw integer never leaves this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(u8);

impl RoomId {
    /// Validate a raw client-supplied id against the configured room range.
    pub fn from_raw(raw: i64, min_room: u8, num_rooms: u8) -> Option<Self> {
        let min = i64::from(min_room);
        let max = min + i64::from(num_rooms);
        (min..max).contains(&raw).then(|| Self(raw as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Membership set of one room.
#[derive(Debug, Default)]
struct Room {
    members: IndexSet<SessionId>,
}

/// Static set of rooms tracking which sessions are joined to each.
///
/// Rooms are created once at startup; a session appears in at most one room,
/// and occupancy is always the size of the membership set.
#[derive(Debug)]
pub struct RoomManager {
    min_room: u8,
    rooms: Vec<Room>,
}

impl RoomManager {
    pub fn new(min_room: u8, num_rooms: u8) -> Self {
        let rooms = (0..num_rooms).map(|_| Room::default()).collect();
        Self { min_room, rooms }
    }

    fn index(&self, room: RoomId) -> usize {
        usize::from(room.get() - self.min_room)
    }

    pub fn join(&mut self, room: RoomId, session: SessionId) {
        let index = self.index(room);
        self.rooms[index].members.insert(session);
    }

    pub fn leave(&mut self, room: RoomId, session: &SessionId) {
        let index = self.index(room);
        self.rooms[index].members.swap_remove(session);
    }

    pub fn members(&self, room: RoomId) -> &IndexSet<SessionId> {
        &self.rooms[self.index(room)].members
    }

    pub fn occupancy(&self, room: RoomId) -> usize {
        self.members(room).len()
    }

    /// All room ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = RoomId> + '_ {
        (0..self.rooms.len()).map(|offset| RoomId(self.min_room + offset as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> SessionId {
        SessionId::new(name.to_string())
    }

    #[test]
    fn room_ids_render_as_decimal_strings() {
        let room = RoomId::from_raw(0, 0, 4).unwrap();
        assert_eq!(room.to_string(), "0");
        assert_eq!(serde_json::to_string(&room).unwrap(), r#""0""#);
    }

    #[test]
    fn from_raw_rejects_out_of_range_ids() {
        assert!(RoomId::from_raw(-1, 0, 4).is_none());
        assert!(RoomId::from_raw(4, 0, 4).is_none());
        assert!(RoomId::from_raw(0, 0, 4).is_some());
        assert!(RoomId::from_raw(3, 0, 4).is_some());
    }

    #[test]
    fn from_raw_honours_a_nonzero_minimum() {
        assert!(RoomId::from_raw(0, 1, 3).is_none());
        assert_eq!(RoomId::from_raw(3, 1, 3).unwrap().get(), 3);
        assert!(RoomId::from_raw(4, 1, 3).is_none());
    }

    #[test]
    fn join_and_leave_track_occupancy() {
        let mut rooms = RoomManager::new(0, 4);
        let room = RoomId::from_raw(2, 0, 4).unwrap();
        rooms.join(room, session("a"));
        rooms.join(room, session("b"));
        assert_eq!(rooms.occupancy(room), 2);

        rooms.leave(room, &session("a"));
        assert_eq!(rooms.occupancy(room), 1);
        assert!(rooms.members(room).contains(&session("b")));
    }

    #[test]
    fn join_is_idempotent_per_session() {
        let mut rooms = RoomManager::new(0, 4);
        let room = RoomId::from_raw(0, 0, 4).unwrap();
        rooms.join(room, session("a"));
        rooms.join(room, session("a"));
        assert_eq!(rooms.occupancy(room), 1);
    }

    #[test]
    fn leave_of_absent_session_is_a_noop() {
        let mut rooms = RoomManager::new(0, 4);
        let room = RoomId::from_raw(1, 0, 4).unwrap();
        rooms.leave(room, &session("ghost"));
        assert_eq!(rooms.occupancy(room), 0);
    }
}
