use crate::{dto::ws::LeaderEntry, state::rooms::RoomId};

/// The single global round record shared by every room.
#[derive(Debug)]
pub struct RoundState {
    /// True during Play; scores are frozen whenever this is false.
    pub round_in_progress: bool,
    /// Seconds left until the next round starts, counting down across both phases.
    pub secs_remaining: u64,
    /// Final scoreboard of the previous round, per room; empty before the
    /// first round ends.
    last_results: Vec<Vec<LeaderEntry>>,
    min_room: u8,
}

impl RoundState {
    pub fn new(min_room: u8, num_rooms: u8) -> Self {
        Self {
            round_in_progress: false,
            secs_remaining: 0,
            last_results: (0..num_rooms).map(|_| Vec::new()).collect(),
            min_room,
        }
    }

    fn index(&self, room: RoomId) -> usize {
        usize::from(room.get() - self.min_room)
    }

    pub fn last_results(&self, room: RoomId) -> &[LeaderEntry] {
        &self.last_results[self.index(room)]
    }

    /// Overwrite a room's results at round end.
    pub fn set_last_results(&mut self, room: RoomId, results: Vec<LeaderEntry>) {
        let index = self.index(room);
        self.last_results[index] = results;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_start_empty_and_are_overwritten() {
        let mut round = RoundState::new(0, 4);
        let room = RoomId::from_raw(1, 0, 4).unwrap();
        assert!(round.last_results(room).is_empty());

        round.set_last_results(
            room,
            vec![LeaderEntry {
                tag: "Alice".into(),
                points: 7,
            }],
        );
        assert_eq!(round.last_results(room).len(), 1);

        round.set_last_results(room, Vec::new());
        assert!(round.last_results(room).is_empty());
    }
}
