//! Error types for call orchestration.

use televisit_media_core::{MediaError, TransportError};
use televisit_signaling_core::SignalingError;
use thiserror::Error;

use crate::registry::RegistryError;

/// Result type for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors surfaced by the call manager and call sessions.
#[derive(Error, Debug)]
pub enum CallError {
    /// Local capture devices could not be acquired
    #[error("media unavailable: {0}")]
    MediaUnavailable(#[from] MediaError),

    /// The peer transport failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The signaling channel failed
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The appointment registry failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// An operation was attempted in a phase that does not permit it
    #[error("invalid state: {message}")]
    InvalidState {
        /// What was attempted and why it was refused
        message: String,
    },

    /// No session with the given id is known to the manager
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The id that failed to resolve
        session_id: String,
    },

    /// No appointment with the given id exists in the registry
    #[error("appointment not found: {appointment_id}")]
    AppointmentNotFound {
        /// The id that failed to resolve
        appointment_id: String,
    },

    /// The supplied configuration is unusable
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// An internal invariant was violated
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violation
        message: String,
    },
}

impl CallError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound { session_id: session_id.into() }
    }

    /// Create an appointment not found error
    pub fn appointment_not_found(appointment_id: impl Into<String>) -> Self {
        Self::AppointmentNotFound { appointment_id: appointment_id.into() }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error means the session cannot become usable.
    ///
    /// Fatal errors leave a ringing session ringing; the caller decides
    /// between retrying acceptance and declining. Non-fatal errors are
    /// logged and worked around.
    pub fn is_fatal_to_session(&self) -> bool {
        match self {
            Self::MediaUnavailable(_) => true,
            Self::Transport(e) => e.is_creation_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_and_transport_creation_failures_are_fatal() {
        let media: CallError = MediaError::device_unavailable("no camera").into();
        assert!(media.is_fatal_to_session());

        let creation: CallError = TransportError::creation_failed("no ice").into();
        assert!(creation.is_fatal_to_session());

        let candidate: CallError = TransportError::candidate_rejected("stale").into();
        assert!(!candidate.is_fatal_to_session());

        assert!(!CallError::invalid_state("already ended").is_fatal_to_session());
    }

    #[test]
    fn errors_render_with_context() {
        let err = CallError::session_not_found("call-apt-9");
        assert_eq!(err.to_string(), "session not found: call-apt-9");
    }
}
