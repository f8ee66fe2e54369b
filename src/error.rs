use thiserror::Error;

/// Validation failures for the profile carried by `client_ready` and
/// `change_room`, ordered by the stage at which they are detected.
///
/// The `Display` form of each variant is the `error_str` sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientReadyError {
    #[error("Missing request data")]
    MissingRequest,
    #[error("Missing player profile")]
    MissingProfile,
    #[error("Difficulty level is missing")]
    MissingRoom,
    #[error("Difficulty level is not a number")]
    NotInteger,
    #[error("Difficulty level is out of range")]
    OutOfRange,
}

/// Validation failures for inbound score reports and final-score requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("Unrecognized player")]
    UnrecognizedPlayer,
    #[error("Score report carries no points")]
    MissingPoints,
}
