use thiserror::Error;

/// Errors that cross the library's public boundary.
///
/// Everything else (send failures, probe failures, teardown failures,
/// staleness) is absorbed into the state machine and surfaced through
/// state notifications and boolean returns.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open remote session: {0}")]
    ConnectFailed(String),

    #[error("invalid connection policy: {0}")]
    InvalidPolicy(String),
}
