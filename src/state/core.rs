use crate::{
    config::AppConfig,
    dto::ws::LeaderEntry,
    state::{
        registry::PlayerRegistry,
        rooms::{RoomId, RoomManager},
        round::RoundState,
    },
};

/// The one owning value for everything the cadence engine and the message
/// router both touch: player records, room membership, and round state.
///
/// Lives behind a single lock in [`crate::state::AppState`]; every mutation
/// goes through that serial context.
#[derive(Debug)]
pub struct ServerCore {
    pub registry: PlayerRegistry,
    pub rooms: RoomManager,
    pub round: RoundState,
}

impl ServerCore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            rooms: RoomManager::new(config.min_room, config.num_rooms),
            round: RoundState::new(config.min_room, config.num_rooms),
        }
    }

    /// Scoreboard for one room, highest points first.
    ///
    /// Ties keep membership order, so a single emission is deterministic.
    pub fn leaders(&self, room: RoomId) -> Vec<LeaderEntry> {
        let mut leaders: Vec<LeaderEntry> = self
            .rooms
            .members(room)
            .iter()
            .filter_map(|session| self.registry.get(session))
            .map(LeaderEntry::from)
            .collect();
        leaders.sort_by(|a, b| b.points.cmp(&a.points));
        leaders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::registry::SessionId;

    fn join(core: &mut ServerCore, name: &str, room: RoomId, points: u64) {
        let session = SessionId::new(name.to_string());
        core.registry.attach(session.clone(), Some(name), room, false);
        core.rooms.join(room, session.clone());
        if let Some(player) = core.registry.get_mut(&session) {
            player.points = points;
        }
    }

    #[test]
    fn leaders_sort_descending_by_points() {
        let config = AppConfig::default();
        let mut core = ServerCore::new(&config);
        let room = RoomId::from_raw(1, 0, 4).unwrap();
        join(&mut core, "low", room, 2);
        join(&mut core, "high", room, 9);
        join(&mut core, "mid", room, 5);

        let tags: Vec<_> = core.leaders(room).into_iter().map(|l| l.tag).collect();
        assert_eq!(tags, ["high", "mid", "low"]);
    }

    #[test]
    fn leaders_with_equal_points_keep_membership_order() {
        let config = AppConfig::default();
        let mut core = ServerCore::new(&config);
        let room = RoomId::from_raw(0, 0, 4).unwrap();
        join(&mut core, "first", room, 3);
        join(&mut core, "second", room, 3);

        let tags: Vec<_> = core.leaders(room).into_iter().map(|l| l.tag).collect();
        assert_eq!(tags, ["first", "second"]);
    }

    #[test]
    fn leaders_only_cover_the_requested_room() {
        let config = AppConfig::default();
        let mut core = ServerCore::new(&config);
        let here = RoomId::from_raw(0, 0, 4).unwrap();
        let elsewhere = RoomId::from_raw(3, 0, 4).unwrap();
        join(&mut core, "here", here, 1);
        join(&mut core, "elsewhere", elsewhere, 8);

        let tags: Vec<_> = core.leaders(here).into_iter().map(|l| l.tag).collect();
        assert_eq!(tags, ["here"]);
    }
}
