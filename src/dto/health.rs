use serde::Serialize;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status (always "ok"; the server has no degraded mode).
    pub status: String,
    /// Number of sessions with at least one live endpoint.
    pub sessions: usize,
    /// Current round phase ("play" or "lobby").
    pub phase: String,
    /// Seconds left on the shared round clock.
    pub secs_remaining: u64,
}
