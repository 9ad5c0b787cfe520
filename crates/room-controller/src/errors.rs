//! Room Controller error types.
//!
//! All inbound command failures result in a silent drop toward the client;
//! errors exist for internal propagation and logging only. Details are never
//! echoed back over the wire.

use thiserror::Error;

/// Room Controller error type.
#[derive(Debug, Error)]
pub enum RcError {
    /// Inbound payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller lacks host authority for the requested operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Command rejected by the per-connection rate limiter.
    #[error("Rate limited: {kind}")]
    RateLimited { kind: &'static str },

    /// Room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Connection is not registered.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Playback snapshot store failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal error (channel failures, actor lifecycle races).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Whether this error is an expected consequence of client behavior
    /// (logged at debug) rather than a server-side fault (logged at warn).
    /// Unknown connections count as client behavior: a command can race the
    /// liveness sweep or arrive from a socket that never registered.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            RcError::Validation(_)
                | RcError::Unauthorized(_)
                | RcError::RateLimited { .. }
                | RcError::RoomNotFound(_)
                | RcError::ConnectionNotFound(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", RcError::Validation("bad room id".to_string())),
            "Validation error: bad room id"
        );
        assert_eq!(
            format!("{}", RcError::RateLimited { kind: "play" }),
            "Rate limited: play"
        );
        assert_eq!(
            format!("{}", RcError::RoomNotFound("movie-night".to_string())),
            "Room not found: movie-night"
        );
    }

    #[test]
    fn test_client_fault_classification() {
        assert!(RcError::Validation("x".to_string()).is_client_fault());
        assert!(RcError::Unauthorized("x".to_string()).is_client_fault());
        assert!(RcError::RateLimited { kind: "seek" }.is_client_fault());
        assert!(RcError::RoomNotFound("x".to_string()).is_client_fault());
        // A command racing the liveness sweep is routine, not a server fault.
        assert!(RcError::ConnectionNotFound("x".to_string()).is_client_fault());

        assert!(!RcError::Internal("x".to_string()).is_client_fault());
        assert!(!RcError::Persistence("x".to_string()).is_client_fault());
    }
}
