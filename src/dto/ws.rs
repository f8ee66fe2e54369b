use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{registry::Player, rooms::RoomId};

/// Wire envelope shared by both directions: a named event plus a JSON payload.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    pub event: &'a str,
    pub data: &'a T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
/// Messages accepted from quiz WebSocket clients.
pub enum ClientEvent {
    ClientReady(Option<ReadyRequest>),
    ChangeRoom(Option<ReadyRequest>),
    PlayerScored(Option<ScoreReport>),
    RequestFinalScore,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Request body of `client_ready` and `change_room`.
pub struct ReadyRequest {
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Player-supplied profile: an optional display tag and the requested room.
///
/// The room is kept as raw JSON so validation can distinguish a missing field
/// from one that does not parse as an integer.
pub struct Profile {
    pub tag: Option<String>,
    pub room: Option<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
/// Request body of `player_scored`.
pub struct ScoreReport {
    pub points: Option<u64>,
}

/// Full player record echoed back on `client_confirmed`.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub tag: String,
    pub points: u64,
    pub room: RoomId,
    pub incomplete_round: bool,
    pub ref_count: u32,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            tag: player.tag.clone(),
            points: player.points,
            room: player.room,
            incomplete_round: player.incomplete_round,
            ref_count: player.ref_count,
        }
    }
}

/// One scoreboard row; also the payload of `gamer_entered_room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderEntry {
    pub tag: String,
    pub points: u64,
}

impl From<&Player> for LeaderEntry {
    fn from(player: &Player) -> Self {
        Self {
            tag: player.tag.clone(),
            points: player.points,
        }
    }
}

/// Payload of `gamers_already_in_room`: everyone in the room, joiner included.
#[derive(Debug, Clone, Serialize)]
pub struct RoomRoster {
    pub leaders: Vec<LeaderEntry>,
}

/// Payload of `gamer_exited_room`.
#[derive(Debug, Clone, Serialize)]
pub struct GamerExited {
    pub tag: String,
}

/// Per-second Play broadcast: countdown plus the room scoreboard.
#[derive(Debug, Clone, Serialize)]
pub struct PlayTimerUpdate {
    pub time_remaining: u64,
    pub leaders: Vec<LeaderEntry>,
}

/// Payload of `final_round_score`.
#[derive(Debug, Clone, Serialize)]
pub struct FinalRoundScore {
    pub points: u64,
    pub round_complete: bool,
}

/// Payload of every `error_*` event.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub error_str: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<Value>,
}
