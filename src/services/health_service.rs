use crate::{dto::health::HealthResponse, state::SharedState};

/// Snapshot the connection count and round phase for the health route.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let core = state.lock_core();
    let phase = if core.round.round_in_progress {
        "play"
    } else {
        "lobby"
    };
    HealthResponse {
        status: "ok".to_string(),
        sessions: state.hub().session_count(),
        phase: phase.to_string(),
        secs_remaining: core.round.secs_remaining,
    }
}
