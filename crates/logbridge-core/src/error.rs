//! Error taxonomy shared by both sides of the bridge.

use thiserror::Error;

/// What went wrong, mapped from the streaming channel's status codes where
/// applicable. The kind decides retry behaviour: `Cancelled` and `NotFound`
/// are intentional stops, auth kinds flip connectivity and wait for it to
/// come back, `Transient` goes through backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed request parameters, surfaced to the HTTP client.
    BadRequest,
    /// Missing or rejected client certificate, or channel-level auth failure.
    Unauthenticated,
    /// The channel rejected the caller's permissions.
    PermissionDenied,
    /// No live connection to the named agent.
    AgentUnavailable,
    /// The orchestration log source could not be opened.
    SourceUnavailable,
    /// Any other channel or read error; retried with backoff on the live path.
    Transient,
    /// Intentional termination signal, never retried.
    Cancelled,
    /// The peer does not know the request, never retried.
    NotFound,
    /// Bug territory (lost tasks, serialization of our own types failing).
    Internal,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Transient, err.to_string())
    }
}
