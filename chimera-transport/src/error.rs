use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a [`crate::Transport`] implementation.
///
/// [`TransportError::NotValid`] is not a failure in the ordinary sense: it is the sentinel a
/// chassis returns for a field that has never been written on the current shadow/working side.
/// Callers that fan out `get`s across every distribution variant of an impairment expect most of
/// them to come back `NotValid` and filter those out rather than propagating them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("field has no current value")]
    NotValid,

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection to the device failed: {0}")]
    Connection(String),

    #[error("device rejected the command: {0}")]
    Rejected(String),

    #[error("malformed response for {path}: {reason}")]
    MalformedResponse { path: String, reason: String },
}

impl TransportError {
    /// True for the sentinel returned by unset distribution fields; callers filter these out of
    /// fan-out reads instead of treating them as failures.
    pub fn is_not_valid(&self) -> bool {
        matches!(self, TransportError::NotValid)
    }
}
