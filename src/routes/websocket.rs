use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    services::websocket_service,
    state::{SharedState, registry::SessionId},
};

#[derive(Debug, Deserialize)]
/// Query parameters accepted by the WebSocket endpoint.
pub struct WsQuery {
    /// Persistent client identity; tabs of one client reuse the same value.
    session: Option<String>,
}

/// Upgrade the HTTP connection into a quiz WebSocket session.
///
/// Clients without a session id get a fresh one, which makes every such
/// connection its own single-endpoint session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session = SessionId::new(
        query
            .session
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
    );
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, session))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
