use std::time::Duration;
use thiserror::Error;

/// Errors produced by a live session.
///
/// Retry policy is not encoded here; the session state machine decides which
/// failures are recovered through reconnection and which are terminal.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("setup was not acknowledged within {0:?}")]
    SetupTimeout(Duration),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// True for failures the session may recover from by reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_) | SessionError::SetupTimeout(_)
        )
    }
}
