/// Self-calibrating once-per-second tick source.
pub mod clock;
/// Health check service.
pub mod health_service;
/// Round scheduler driving the Play/Lobby cadence.
pub mod round_service;
/// Inbound client event validation and dispatch.
pub mod router_service;
/// WebSocket connection lifecycle.
pub mod websocket_service;
/// Outbound WebSocket event names and emission helpers.
pub mod ws_events;
