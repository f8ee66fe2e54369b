use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    dto::ws::Envelope,
    state::{registry::SessionId, rooms::RoomId},
};

/// Handle used to push messages to one connected endpoint (one tab).
#[derive(Debug)]
struct Endpoint {
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
}

/// Connection hub: the registry of live endpoints plus targeted fan-out.
///
/// Fan-out is fire-and-forget. Each endpoint has its own unbounded writer
/// queue, so messages to a given destination arrive in send order; a failed
/// send means the endpoint is already gone and its disconnect will clean up.
#[derive(Debug, Default)]
pub struct Hub {
    endpoints: DashMap<SessionId, Vec<Endpoint>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a writer channel to `session`, returning the endpoint's id.
    pub fn register(&self, session: &SessionId, tx: mpsc::UnboundedSender<Message>) -> Uuid {
        let id = Uuid::new_v4();
        self.endpoints
            .entry(session.clone())
            .or_default()
            .push(Endpoint { id, tx });
        id
    }

    /// Drop one endpoint; the session entry goes away with its last endpoint.
    pub fn unregister(&self, session: &SessionId, endpoint: Uuid) {
        let Some(mut endpoints) = self.endpoints.get_mut(session) else {
            return;
        };
        endpoints.retain(|candidate| candidate.id != endpoint);
        let emptied = endpoints.is_empty();
        drop(endpoints);
        if emptied {
            self.endpoints.remove_if(session, |_, value| value.is_empty());
        }
    }

    /// Number of sessions with at least one live endpoint.
    pub fn session_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Unicast to every endpoint of one session.
    pub fn emit_to(&self, session: &SessionId, event: &str, data: &impl Serialize) {
        if let Some(message) = encode(event, data) {
            self.push(session, &message);
        }
    }

    /// Fan out to every connected session.
    pub fn broadcast_all(&self, event: &str, data: &impl Serialize) {
        let Some(message) = encode(event, data) else {
            return;
        };
        for entry in self.endpoints.iter() {
            for endpoint in entry.value() {
                forward(endpoint, &message);
            }
        }
    }

    /// Fan out to every member of `room`.
    ///
    /// `members` is the membership snapshot taken under the core lock; an
    /// empty snapshot sends nothing.
    pub fn broadcast_to_room(
        &self,
        room: RoomId,
        members: &IndexSet<SessionId>,
        event: &str,
        data: &impl Serialize,
    ) {
        let Some(message) = encode(event, data) else {
            return;
        };
        trace!(room = %room, event, receivers = members.len(), "room broadcast");
        for session in members {
            self.push(session, &message);
        }
    }

    /// Fan out to every member of `room` except the originating session.
    pub fn broadcast_to_room_excluding_sender(
        &self,
        room: RoomId,
        members: &IndexSet<SessionId>,
        sender: &SessionId,
        event: &str,
        data: &impl Serialize,
    ) {
        let Some(message) = encode(event, data) else {
            return;
        };
        trace!(room = %room, event, sender = %sender, "room broadcast excluding sender");
        for session in members {
            if session != sender {
                self.push(session, &message);
            }
        }
    }

    fn push(&self, session: &SessionId, message: &Message) {
        let Some(endpoints) = self.endpoints.get(session) else {
            return;
        };
        for endpoint in endpoints.iter() {
            forward(endpoint, message);
        }
    }
}

fn forward(endpoint: &Endpoint, message: &Message) {
    if endpoint.tx.send(message.clone()).is_err() {
        debug!(endpoint = %endpoint.id, "dropping message for closed endpoint");
    }
}

/// Serialize an event envelope once per fan-out.
fn encode(event: &str, data: &impl Serialize) -> Option<Message> {
    match serde_json::to_string(&Envelope { event, data }) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize outbound payload");
            None
        }
    }
}
