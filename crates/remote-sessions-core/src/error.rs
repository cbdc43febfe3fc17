//! Error type shared by the session manager and its collaborators.

use thiserror::Error;

use crate::SessionId;

/// Status the server uses for a temporarily unavailable backend.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Session error.
///
/// `Clone` because one failed poll is both broadcast on the manager's
/// connection-failure signal and returned to every caller awaiting the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid session model: {0}")]
    InvalidModel(String),
    #[error("Failed to decode server response: {0}")]
    Decode(String),
    #[error("Failed to shut down {} session(s)", failures.len())]
    ShutdownAll {
        failures: Vec<(SessionId, SessionError)>,
    },
    #[error("Session manager is disposed")]
    Disposed,
}

impl SessionError {
    /// Whether this failure means the server could not be reached at all,
    /// either connectivity loss or a 503 from the backend.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Http {
                    status: SERVICE_UNAVAILABLE,
                    ..
                }
        )
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
