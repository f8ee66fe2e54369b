use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{
        ClientEvent, FinalRoundScore, LeaderEntry, PlayerSnapshot, ReadyRequest, ScoreReport,
    },
    services::ws_events,
    state::{
        SharedState,
        registry::{AttachOutcome, DetachOutcome, SessionId, determine_room},
    },
};

/// Route one inbound client event to its handler.
pub fn dispatch(state: &SharedState, session: &SessionId, event: ClientEvent) {
    match event {
        ClientEvent::ClientReady(request) => handle_client_ready(state, session, request),
        ClientEvent::ChangeRoom(request) => handle_change_room(state, session, request),
        ClientEvent::PlayerScored(report) => handle_player_scored(state, session, report),
        ClientEvent::RequestFinalScore => handle_request_final_score(state, session),
        ClientEvent::Unknown => debug!(session = %session, "ignoring unknown client event"),
    }
}

/// First contact from an endpoint: validate the profile, create or refcount
/// the player record, join the room, and catch the client up on the round.
pub fn handle_client_ready(
    state: &SharedState,
    session: &SessionId,
    request: Option<ReadyRequest>,
) {
    let room = match determine_room(request.as_ref(), state.config()) {
        Ok(room) => room,
        Err(error) => {
            warn!(session = %session, error = %error, "rejecting client_ready");
            ws_events::send_client_ready_error(state.hub(), session, error, echo(&request));
            return;
        }
    };
    let tag = request
        .and_then(|request| request.profile)
        .and_then(|profile| profile.tag);

    let mut core = state.lock_core();
    let round_in_progress = core.round.round_in_progress;
    let player = match core
        .registry
        .attach(session.clone(), tag.as_deref(), room, round_in_progress)
    {
        AttachOutcome::Existing { ref_count } => {
            debug!(session = %session, ref_count, "additional endpoint for registered session");
            return;
        }
        AttachOutcome::Created(player) => player,
    };
    info!(session = %session, tag = %player.tag, room = %room, "player joined");

    ws_events::send_client_confirmed(state.hub(), session, &PlayerSnapshot::from(&player));

    core.rooms.join(room, session.clone());
    ws_events::broadcast_gamer_entered(
        state.hub(),
        room,
        core.rooms.members(room),
        session,
        &LeaderEntry::from(&player),
    );
    ws_events::send_room_roster(state.hub(), session, core.leaders(room));
    ws_events::send_round_sync(state.hub(), session, &core.round, state.config(), room);
}

/// Move a player to another difficulty room.
pub fn handle_change_room(state: &SharedState, session: &SessionId, request: Option<ReadyRequest>) {
    let new_room = match determine_room(request.as_ref(), state.config()) {
        Ok(room) => room,
        Err(error) => {
            warn!(session = %session, error = %error, "rejecting change_room");
            ws_events::send_client_ready_error(state.hub(), session, error, echo(&request));
            return;
        }
    };

    let mut core = state.lock_core();
    let Some(player) = core.registry.get(session) else {
        warn!(session = %session, "change_room from a session with no player");
        ws_events::send_unrecognized_player(state.hub(), session);
        return;
    };
    let old_room = player.room;
    let entry = LeaderEntry::from(player);
    if new_room == old_room {
        debug!(session = %session, room = %old_room, "already in the requested room");
        return;
    }

    core.rooms.leave(old_room, session);
    if core.rooms.occupancy(old_room) > 0 {
        ws_events::broadcast_gamer_exited(
            state.hub(),
            old_room,
            core.rooms.members(old_room),
            &entry.tag,
        );
    }

    core.registry.set_room(session, new_room);
    core.rooms.join(new_room, session.clone());
    info!(session = %session, from = %old_room, to = %new_room, "player changed room");

    ws_events::broadcast_gamer_entered(
        state.hub(),
        new_room,
        core.rooms.members(new_room),
        session,
        &entry,
    );
    ws_events::send_room_roster(state.hub(), session, core.leaders(new_room));
    // The sync bundle carries the previous room's results, exactly as a
    // disconnect followed by a rejoin would.
    ws_events::send_round_sync(state.hub(), session, &core.round, state.config(), old_room);
}

/// One endpoint went away; the player record goes with its last endpoint.
pub fn handle_disconnect(state: &SharedState, session: &SessionId) {
    let mut core = state.lock_core();
    match core.registry.detach(session) {
        DetachOutcome::NotRegistered => {}
        DetachOutcome::StillConnected { ref_count } => {
            debug!(session = %session, ref_count, "endpoint closed; session still connected");
        }
        DetachOutcome::Removed(player) => {
            core.rooms.leave(player.room, session);
            if core.rooms.occupancy(player.room) > 0 {
                ws_events::broadcast_gamer_exited(
                    state.hub(),
                    player.room,
                    core.rooms.members(player.room),
                    &player.tag,
                );
            }
            info!(session = %session, tag = %player.tag, "player left");
        }
    }
}

/// Accept a score during Play; scores are frozen during Lobby.
pub fn handle_player_scored(
    state: &SharedState,
    session: &SessionId,
    report: Option<ScoreReport>,
) {
    let mut core = state.lock_core();
    if !core.registry.contains(session) {
        warn!(session = %session, "score report from a session with no player");
        ws_events::send_unrecognized_player(state.hub(), session);
        return;
    }
    let Some(points) = report.and_then(|report| report.points) else {
        warn!(session = %session, "score report carries no points");
        ws_events::send_score_error(state.hub(), session, echo(&report));
        return;
    };

    if core.round.round_in_progress {
        if let Some(player) = core.registry.get_mut(session) {
            player.points = points;
        }
    } else {
        debug!(session = %session, points, "ignoring score reported during lobby");
    }
}

/// Report a player's score for the round in progress or just finished.
///
/// Asking mid-Play means the player is leaving before the round completes,
/// so the record is marked incomplete before answering.
pub fn handle_request_final_score(state: &SharedState, session: &SessionId) {
    let mut core = state.lock_core();
    let round_in_progress = core.round.round_in_progress;
    let Some(player) = core.registry.get_mut(session) else {
        warn!(session = %session, "final score request from a session with no player");
        ws_events::send_unrecognized_player(state.hub(), session);
        return;
    };

    if round_in_progress {
        player.incomplete_round = true;
    }
    let payload = FinalRoundScore {
        points: player.points,
        round_complete: !player.incomplete_round,
    };
    ws_events::send_final_round_score(state.hub(), session, &payload);
}

/// Echo the offending input back inside an error event.
fn echo<T: Serialize>(input: &Option<T>) -> Option<Value> {
    input
        .as_ref()
        .and_then(|value| serde_json::to_value(value).ok())
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::Profile,
        state::{AppState, rooms::RoomId},
    };

    fn state() -> SharedState {
        AppState::new(AppConfig::default())
    }

    fn connect(state: &SharedState, name: &str) -> (SessionId, mpsc::UnboundedReceiver<Message>) {
        let session = SessionId::new(name.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        state.hub().register(&session, tx);
        (session, rx)
    }

    fn ready(tag: Option<&str>, room: Value) -> Option<ReadyRequest> {
        Some(ReadyRequest {
            profile: Some(Profile {
                tag: tag.map(Into::into),
                room: Some(room),
            }),
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<(String, Value)> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            events.push((
                value["event"].as_str().unwrap_or_default().to_string(),
                value.get("data").cloned().unwrap_or(Value::Null),
            ));
        }
        events
    }

    fn set_lobby(state: &SharedState, secs_remaining: u64) {
        let mut core = state.lock_core();
        core.round.round_in_progress = false;
        core.round.secs_remaining = secs_remaining;
    }

    fn set_play(state: &SharedState, secs_remaining: u64) {
        let mut core = state.lock_core();
        core.round.round_in_progress = true;
        core.round.secs_remaining = secs_remaining;
    }

    #[test]
    fn solo_join_during_lobby() {
        let state = state();
        set_lobby(&state, 15);
        let (alice, mut rx) = connect(&state, "alice");

        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("2")));

        let events = drain(&mut rx);
        let names: Vec<_> = events.iter().map(|(event, _)| event.as_str()).collect();
        assert_eq!(
            names,
            ["client_confirmed", "gamers_already_in_room", "round_ended"]
        );
        assert_eq!(events[0].1["tag"], Value::from("Alice"));
        assert_eq!(events[0].1["room"], Value::from("2"));
        assert_eq!(events[0].1["ref_count"], Value::from(1));
        assert_eq!(events[0].1["incomplete_round"], Value::from(false));
        assert_eq!(events[1].1["leaders"][0]["tag"], Value::from("Alice"));
        assert_eq!(events[2].1, Value::from(30));
    }

    #[test]
    fn solo_join_sees_previous_results_when_present() {
        let state = state();
        set_lobby(&state, 15);
        {
            let mut core = state.lock_core();
            let room = RoomId::from_raw(2, 0, 4).unwrap();
            core.round.set_last_results(
                room,
                vec![LeaderEntry {
                    tag: "Bob".into(),
                    points: 11,
                }],
            );
        }
        let (alice, mut rx) = connect(&state, "alice");

        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("2")));

        let events = drain(&mut rx);
        let names: Vec<_> = events.iter().map(|(event, _)| event.as_str()).collect();
        assert_eq!(
            names,
            [
                "client_confirmed",
                "gamers_already_in_room",
                "round_ended",
                "room_round_results"
            ]
        );
        assert_eq!(events[3].1[0]["tag"], Value::from("Bob"));
    }

    #[test]
    fn second_join_during_play() {
        let state = state();
        set_play(&state, 120);
        let (bob, mut bob_rx) = connect(&state, "bob");
        handle_client_ready(&state, &bob, ready(Some("Bob"), json!("1")));
        {
            let mut core = state.lock_core();
            core.registry.get_mut(&bob).unwrap().points = 4;
        }
        drain(&mut bob_rx);

        let (carol, mut carol_rx) = connect(&state, "carol");
        handle_client_ready(&state, &carol, ready(Some("Carol"), json!("1")));

        let bob_events = drain(&mut bob_rx);
        assert_eq!(bob_events.len(), 1);
        assert_eq!(bob_events[0].0, "gamer_entered_room");
        assert_eq!(bob_events[0].1["tag"], Value::from("Carol"));
        assert_eq!(bob_events[0].1["points"], Value::from(0));

        let carol_events = drain(&mut carol_rx);
        let names: Vec<_> = carol_events.iter().map(|(event, _)| event.as_str()).collect();
        assert_eq!(
            names,
            ["client_confirmed", "gamers_already_in_room", "round_started"]
        );
        assert_eq!(carol_events[0].1["incomplete_round"], Value::from(true));
        let leaders = carol_events[1].1["leaders"].as_array().unwrap();
        assert_eq!(leaders.len(), 2);
        assert_eq!(leaders[0]["tag"], Value::from("Bob"));
        assert_eq!(leaders[0]["points"], Value::from(4));
        assert_eq!(carol_events[2].1, Value::from(150));
    }

    #[test]
    fn score_accepted_in_play_ignored_in_lobby() {
        let state = state();
        set_play(&state, 120);
        let (alice, mut rx) = connect(&state, "alice");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        drain(&mut rx);

        handle_player_scored(&state, &alice, Some(ScoreReport { points: Some(7) }));
        assert_eq!(state.lock_core().registry.get(&alice).unwrap().points, 7);

        set_lobby(&state, 20);
        handle_player_scored(&state, &alice, Some(ScoreReport { points: Some(9) }));
        assert_eq!(state.lock_core().registry.get(&alice).unwrap().points, 7);
        // No error event for a lobby score; it is only logged.
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn multi_tab_refcounting() {
        let state = state();
        set_lobby(&state, 20);
        let (alice, mut alice_rx) = connect(&state, "alice");
        let (bob, mut bob_rx) = connect(&state, "bob");
        handle_client_ready(&state, &bob, ready(Some("Bob"), json!("0")));
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));

        {
            let core = state.lock_core();
            let player = core.registry.get(&alice).unwrap();
            assert_eq!(player.ref_count, 2);
            assert_eq!(core.registry.len(), 2);
        }
        drain(&mut bob_rx);

        handle_disconnect(&state, &alice);
        {
            let core = state.lock_core();
            assert_eq!(core.registry.get(&alice).unwrap().ref_count, 1);
            let room = RoomId::from_raw(0, 0, 4).unwrap();
            assert!(core.rooms.members(room).contains(&alice));
        }
        assert!(drain(&mut bob_rx).is_empty());

        handle_disconnect(&state, &alice);
        {
            let core = state.lock_core();
            assert!(core.registry.get(&alice).is_none());
            let room = RoomId::from_raw(0, 0, 4).unwrap();
            assert_eq!(core.rooms.occupancy(room), 1);
        }
        let bob_events = drain(&mut bob_rx);
        assert_eq!(bob_events.len(), 1);
        assert_eq!(bob_events[0].0, "gamer_exited_room");
        assert_eq!(bob_events[0].1["tag"], Value::from("Alice"));
        drain(&mut alice_rx);
    }

    #[test]
    fn change_room_to_same_room_is_a_noop() {
        let state = state();
        set_lobby(&state, 20);
        let (alice, mut alice_rx) = connect(&state, "alice");
        let (bob, mut bob_rx) = connect(&state, "bob");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        handle_client_ready(&state, &bob, ready(Some("Bob"), json!("0")));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        handle_change_room(&state, &alice, ready(Some("Alice"), json!("0")));

        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        let core = state.lock_core();
        let room = RoomId::from_raw(0, 0, 4).unwrap();
        assert_eq!(core.rooms.occupancy(room), 2);
    }

    #[test]
    fn change_room_moves_membership_and_syncs_old_results() {
        let state = state();
        set_lobby(&state, 20);
        {
            let mut core = state.lock_core();
            let old_room = RoomId::from_raw(0, 0, 4).unwrap();
            core.round.set_last_results(
                old_room,
                vec![LeaderEntry {
                    tag: "Alice".into(),
                    points: 3,
                }],
            );
        }
        let (alice, mut alice_rx) = connect(&state, "alice");
        let (bob, mut bob_rx) = connect(&state, "bob");
        let (dave, mut dave_rx) = connect(&state, "dave");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        handle_client_ready(&state, &bob, ready(Some("Bob"), json!("0")));
        handle_client_ready(&state, &dave, ready(Some("Dave"), json!("1")));
        drain(&mut alice_rx);
        drain(&mut bob_rx);
        drain(&mut dave_rx);

        handle_change_room(&state, &alice, ready(Some("Alice"), json!("1")));

        let bob_events = drain(&mut bob_rx);
        assert_eq!(bob_events.len(), 1);
        assert_eq!(bob_events[0].0, "gamer_exited_room");

        let dave_events = drain(&mut dave_rx);
        assert_eq!(dave_events.len(), 1);
        assert_eq!(dave_events[0].0, "gamer_entered_room");
        assert_eq!(dave_events[0].1["tag"], Value::from("Alice"));

        let alice_events = drain(&mut alice_rx);
        let names: Vec<_> = alice_events.iter().map(|(event, _)| event.as_str()).collect();
        assert_eq!(
            names,
            ["gamers_already_in_room", "round_ended", "room_round_results"]
        );
        // The results shown are the room Alice just left.
        assert_eq!(alice_events[2].1[0]["points"], Value::from(3));

        let core = state.lock_core();
        assert_eq!(
            core.registry.get(&alice).unwrap().room,
            RoomId::from_raw(1, 0, 4).unwrap()
        );
        let old_room = RoomId::from_raw(0, 0, 4).unwrap();
        let new_room = RoomId::from_raw(1, 0, 4).unwrap();
        assert_eq!(core.rooms.occupancy(old_room), 1);
        assert_eq!(core.rooms.occupancy(new_room), 2);
    }

    #[test]
    fn out_of_range_rooms_are_rejected_with_the_exact_message() {
        let state = state();
        let (alice, mut rx) = connect(&state, "alice");

        for room in [json!("-1"), json!("4")] {
            handle_client_ready(&state, &alice, ready(Some("Alice"), room));
        }

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        for (event, data) in events {
            assert_eq!(event, "error_client_ready");
            assert_eq!(
                data["error_str"],
                Value::from("Difficulty level is out of range")
            );
            assert!(data["user_input"]["profile"].is_object());
        }
        assert!(state.lock_core().registry.is_empty());
    }

    #[test]
    fn whitespace_tag_becomes_a_guest() {
        let state = state();
        let (alice, mut rx) = connect(&state, "alice");

        handle_client_ready(&state, &alice, ready(Some("   "), json!("1")));

        let events = drain(&mut rx);
        assert_eq!(events[0].0, "client_confirmed");
        assert_eq!(events[0].1["tag"], Value::from("Guest 1"));
    }

    #[test]
    fn score_without_player_or_points_is_rejected() {
        let state = state();
        let (ghost, mut ghost_rx) = connect(&state, "ghost");
        handle_player_scored(&state, &ghost, Some(ScoreReport { points: Some(5) }));
        let events = drain(&mut ghost_rx);
        assert_eq!(events[0].0, "error_unrecognized_player");
        assert_eq!(events[0].1["error_str"], Value::from("Unrecognized player"));

        let (alice, mut alice_rx) = connect(&state, "alice");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        drain(&mut alice_rx);
        handle_player_scored(&state, &alice, Some(ScoreReport { points: None }));
        let events = drain(&mut alice_rx);
        assert_eq!(events[0].0, "error_player_scored");
    }

    #[test]
    fn final_score_mid_play_marks_the_round_incomplete() {
        let state = state();
        set_play(&state, 100);
        let (alice, mut rx) = connect(&state, "alice");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        drain(&mut rx);
        handle_player_scored(&state, &alice, Some(ScoreReport { points: Some(6) }));

        handle_request_final_score(&state, &alice);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "final_round_score");
        assert_eq!(events[0].1["points"], Value::from(6));
        assert_eq!(events[0].1["round_complete"], Value::from(false));
        assert!(state.lock_core().registry.get(&alice).unwrap().incomplete_round);
    }

    #[test]
    fn final_score_in_lobby_reports_a_complete_round() {
        let state = state();
        set_lobby(&state, 10);
        let (alice, mut rx) = connect(&state, "alice");
        handle_client_ready(&state, &alice, ready(Some("Alice"), json!("0")));
        drain(&mut rx);

        handle_request_final_score(&state, &alice);

        let events = drain(&mut rx);
        assert_eq!(events[0].0, "final_round_score");
        assert_eq!(events[0].1["round_complete"], Value::from(true));
    }

    #[test]
    fn disconnect_of_unknown_session_is_silent() {
        let state = state();
        let session = SessionId::new("nobody".to_string());
        handle_disconnect(&state, &session);
        assert!(state.lock_core().registry.is_empty());
    }

    #[test]
    fn missing_profile_stages_report_in_order() {
        let state = state();
        let (alice, mut rx) = connect(&state, "alice");

        handle_client_ready(&state, &alice, None);
        handle_client_ready(&state, &alice, Some(ReadyRequest { profile: None }));
        handle_client_ready(
            &state,
            &alice,
            Some(ReadyRequest {
                profile: Some(Profile {
                    tag: None,
                    room: None,
                }),
            }),
        );
        handle_client_ready(&state, &alice, ready(None, json!("two")));

        let messages: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|(_, data)| data["error_str"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            messages,
            [
                "Missing request data",
                "Missing player profile",
                "Difficulty level is missing",
                "Difficulty level is not a number"
            ]
        );
    }
}
