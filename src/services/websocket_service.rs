use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    dto::ws::ClientEvent,
    services::router_service,
    state::{SharedState, registry::SessionId},
};

/// Handle the full lifecycle for an individual client WebSocket connection.
///
/// Each socket is one transport endpoint of `session`; further tabs of the
/// same client arrive as additional sockets carrying the same session id.
pub async fn handle_socket(state: SharedState, socket: WebSocket, session: SessionId) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let endpoint = state.hub().register(&session, outbound_tx.clone());
    info!(session = %session, endpoint = %endpoint, "endpoint connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => router_service::dispatch(&state, &session, event),
                Err(err) => {
                    warn!(session = %session, error = %err, "failed to parse client event");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session = %session, error = %err, "websocket error");
                break;
            }
        }
    }

    state.hub().unregister(&session, endpoint);
    router_service::handle_disconnect(&state, &session);
    info!(session = %session, endpoint = %endpoint, "endpoint disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
