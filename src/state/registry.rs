use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    config::AppConfig,
    dto::ws::ReadyRequest,
    error::ClientReadyError,
    state::rooms::RoomId,
};

/// Persistent client identity, shared by every tab of one logical client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single authoritative record for one confirmed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Display name; synthesized `"Guest <n>"` when the profile has none.
    pub tag: String,
    /// The one room this player is currently joined to.
    pub room: RoomId,
    /// Last score the client reported during Play.
    pub points: u64,
    /// True while the player has not yet seen a round from its beginning.
    pub incomplete_round: bool,
    /// Number of live transport endpoints bound to this session.
    pub ref_count: u32,
}

/// Result of binding one more endpoint to a session.
#[derive(Debug)]
pub enum AttachOutcome {
    /// The session was already registered; it now has one more endpoint.
    Existing { ref_count: u32 },
    /// A fresh player record was created for the session.
    Created(Player),
}

/// Result of unbinding one endpoint from a session.
#[derive(Debug)]
pub enum DetachOutcome {
    /// The session was never registered.
    NotRegistered,
    /// Other endpoints still hold the session open.
    StillConnected { ref_count: u32 },
    /// The last endpoint went away; the record has been removed.
    Removed(Player),
}

/// Mapping from session identity to the player record it owns.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: IndexMap<SessionId, Player>,
    guest_seq: u64,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session: &SessionId) -> Option<&Player> {
        self.players.get(session)
    }

    pub fn get_mut(&mut self, session: &SessionId) -> Option<&mut Player> {
        self.players.get_mut(session)
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.players.contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Bind an endpoint to `session`, creating the player record on first contact.
    ///
    /// A player joining mid-round starts with `incomplete_round` set; it is
    /// cleared for everyone when the next round begins.
    pub fn attach(
        &mut self,
        session: SessionId,
        tag: Option<&str>,
        room: RoomId,
        round_in_progress: bool,
    ) -> AttachOutcome {
        if let Some(player) = self.players.get_mut(&session) {
            player.ref_count += 1;
            return AttachOutcome::Existing {
                ref_count: player.ref_count,
            };
        }

        let player = Player {
            tag: self.resolve_tag(tag),
            room,
            points: 0,
            incomplete_round: round_in_progress,
            ref_count: 1,
        };
        self.players.insert(session, player.clone());
        AttachOutcome::Created(player)
    }

    /// Unbind one endpoint; the record goes away with its last endpoint.
    pub fn detach(&mut self, session: &SessionId) -> DetachOutcome {
        let Some(player) = self.players.get_mut(session) else {
            return DetachOutcome::NotRegistered;
        };

        player.ref_count -= 1;
        if player.ref_count > 0 {
            return DetachOutcome::StillConnected {
                ref_count: player.ref_count,
            };
        }

        match self.players.swap_remove(session) {
            Some(player) => DetachOutcome::Removed(player),
            None => DetachOutcome::NotRegistered,
        }
    }

    pub fn set_room(&mut self, session: &SessionId, room: RoomId) {
        if let Some(player) = self.players.get_mut(session) {
            player.room = room;
        }
    }

    fn resolve_tag(&mut self, tag: Option<&str>) -> String {
        match tag.map(str::trim).filter(|tag| !tag.is_empty()) {
            Some(tag) => tag.to_string(),
            None => {
                self.guest_seq += 1;
                format!("Guest {}", self.guest_seq)
            }
        }
    }
}

/// Extract and validate the requested room from a `client_ready` /
/// `change_room` request.
///
/// Checks run in a fixed order so the client always sees the earliest
/// failure: request present, profile present, room present, room an integer,
/// room in range.
pub fn determine_room(
    request: Option<&ReadyRequest>,
    config: &AppConfig,
) -> Result<RoomId, ClientReadyError> {
    let request = request.ok_or(ClientReadyError::MissingRequest)?;
    let profile = request
        .profile
        .as_ref()
        .ok_or(ClientReadyError::MissingProfile)?;
    let room = profile.room.as_ref().ok_or(ClientReadyError::MissingRoom)?;
    let raw = parse_room_value(room).ok_or(ClientReadyError::NotInteger)?;
    RoomId::from_raw(raw, config.min_room, config.num_rooms).ok_or(ClientReadyError::OutOfRange)
}

fn parse_room_value(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}
