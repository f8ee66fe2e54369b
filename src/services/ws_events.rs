use indexmap::IndexSet;
use serde_json::Value;

use crate::{
    config::AppConfig,
    dto::ws::{
        FinalRoundScore, GamerExited, LeaderEntry, PlayTimerUpdate, PlayerSnapshot, RoomRoster,
        WireError,
    },
    error::{ClientReadyError, ScoreError},
    state::{hub::Hub, registry::SessionId, rooms::RoomId, round::RoundState},
};

pub const EVENT_CLIENT_CONFIRMED: &str = "client_confirmed";
pub const EVENT_ERROR_CLIENT_READY: &str = "error_client_ready";
pub const EVENT_ERROR_UNRECOGNIZED_PLAYER: &str = "error_unrecognized_player";
pub const EVENT_ERROR_PLAYER_SCORED: &str = "error_player_scored";
pub const EVENT_GAMER_ENTERED_ROOM: &str = "gamer_entered_room";
pub const EVENT_GAMER_EXITED_ROOM: &str = "gamer_exited_room";
pub const EVENT_GAMERS_ALREADY_IN_ROOM: &str = "gamers_already_in_room";
pub const EVENT_ROUND_STARTED: &str = "round_started";
pub const EVENT_ROUND_ENDED: &str = "round_ended";
pub const EVENT_PLAY_TIMER_UPDATE: &str = "play_timer_update";
pub const EVENT_LOBBY_TIMER_UPDATE: &str = "lobby_timer_update";
pub const EVENT_ROOM_ROUND_RESULTS: &str = "room_round_results";
pub const EVENT_FINAL_ROUND_SCORE: &str = "final_round_score";

/// Confirm a fresh player record to its own session.
pub fn send_client_confirmed(hub: &Hub, session: &SessionId, snapshot: &PlayerSnapshot) {
    hub.emit_to(session, EVENT_CLIENT_CONFIRMED, snapshot);
}

/// Tell everyone already in the room that a player arrived.
pub fn broadcast_gamer_entered(
    hub: &Hub,
    room: RoomId,
    members: &IndexSet<SessionId>,
    sender: &SessionId,
    entry: &LeaderEntry,
) {
    hub.broadcast_to_room_excluding_sender(room, members, sender, EVENT_GAMER_ENTERED_ROOM, entry);
}

/// Tell the remaining members of a room that a player left it.
pub fn broadcast_gamer_exited(hub: &Hub, room: RoomId, members: &IndexSet<SessionId>, tag: &str) {
    hub.broadcast_to_room(
        room,
        members,
        EVENT_GAMER_EXITED_ROOM,
        &GamerExited {
            tag: tag.to_string(),
        },
    );
}

/// Show a joiner who is already in the room, themselves included.
pub fn send_room_roster(hub: &Hub, session: &SessionId, leaders: Vec<LeaderEntry>) {
    hub.emit_to(session, EVENT_GAMERS_ALREADY_IN_ROOM, &RoomRoster { leaders });
}

/// Announce a new round to every connection.
pub fn broadcast_round_started(hub: &Hub, play_secs: u64) {
    hub.broadcast_all(EVENT_ROUND_STARTED, &play_secs);
}

/// Announce the end of a round to every connection.
pub fn broadcast_round_ended(hub: &Hub, lobby_secs: u64) {
    hub.broadcast_all(EVENT_ROUND_ENDED, &lobby_secs);
}

/// Publish a room's final scoreboard at round end.
pub fn broadcast_room_results(
    hub: &Hub,
    room: RoomId,
    members: &IndexSet<SessionId>,
    results: &[LeaderEntry],
) {
    hub.broadcast_to_room(room, members, EVENT_ROOM_ROUND_RESULTS, &results);
}

/// Per-second Play countdown and scoreboard for one room.
pub fn broadcast_play_timer(
    hub: &Hub,
    room: RoomId,
    members: &IndexSet<SessionId>,
    update: &PlayTimerUpdate,
) {
    hub.broadcast_to_room(room, members, EVENT_PLAY_TIMER_UPDATE, update);
}

/// Per-second Lobby countdown for one room.
pub fn broadcast_lobby_timer(
    hub: &Hub,
    room: RoomId,
    members: &IndexSet<SessionId>,
    secs_remaining: u64,
) {
    hub.broadcast_to_room(room, members, EVENT_LOBBY_TIMER_UPDATE, &secs_remaining);
}

/// Answer a `request_final_score`.
pub fn send_final_round_score(hub: &Hub, session: &SessionId, payload: &FinalRoundScore) {
    hub.emit_to(session, EVENT_FINAL_ROUND_SCORE, payload);
}

/// Catch a session up with the phase it joined into: the running round, or
/// the lobby countdown plus the previous results of `results_room`.
pub fn send_round_sync(
    hub: &Hub,
    session: &SessionId,
    round: &RoundState,
    config: &AppConfig,
    results_room: RoomId,
) {
    if round.round_in_progress {
        hub.emit_to(session, EVENT_ROUND_STARTED, &config.play_secs());
    } else {
        hub.emit_to(session, EVENT_ROUND_ENDED, &config.lobby_secs);
        let results = round.last_results(results_room);
        if !results.is_empty() {
            hub.emit_to(session, EVENT_ROOM_ROUND_RESULTS, &results);
        }
    }
}

/// Reject a malformed `client_ready`/`change_room`, echoing the input.
pub fn send_client_ready_error(
    hub: &Hub,
    session: &SessionId,
    error: ClientReadyError,
    user_input: Option<Value>,
) {
    hub.emit_to(
        session,
        EVENT_ERROR_CLIENT_READY,
        &WireError {
            error_str: error.to_string(),
            user_input,
        },
    );
}

/// Reject a message that presumes an attached player.
pub fn send_unrecognized_player(hub: &Hub, session: &SessionId) {
    hub.emit_to(
        session,
        EVENT_ERROR_UNRECOGNIZED_PLAYER,
        &WireError {
            error_str: ScoreError::UnrecognizedPlayer.to_string(),
            user_input: None,
        },
    );
}

/// Reject a score report with no points.
pub fn send_score_error(hub: &Hub, session: &SessionId, user_input: Option<Value>) {
    hub.emit_to(
        session,
        EVENT_ERROR_PLAYER_SCORED,
        &WireError {
            error_str: ScoreError::MissingPoints.to_string(),
            user_input,
        },
    );
}
