//! Error types for media acquisition and the peer transport.

use thiserror::Error;

/// Result type for capture-device operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for peer-transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors from capture device acquisition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user or platform refused access to the device.
    #[error("Media permission denied: {message}")]
    PermissionDenied {
        /// Which request was refused.
        message: String,
    },

    /// No usable device of the requested kind exists.
    #[error("Media device unavailable: {message}")]
    DeviceUnavailable {
        /// Which device is missing.
        message: String,
    },
}

impl MediaError {
    /// Create a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a device-unavailable error.
    pub fn device_unavailable(message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
        }
    }
}

/// Errors from the peer transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport object could not be constructed at all.
    ///
    /// Fatal to the session that requested it.
    #[error("Transport creation failed: {message}")]
    CreationFailed {
        /// Why construction failed.
        message: String,
    },

    /// A session description could not be produced or applied.
    #[error("Invalid description: {message}")]
    InvalidDescription {
        /// What was wrong with it.
        message: String,
    },

    /// A network-path candidate could not be applied.
    ///
    /// Stale or malformed candidates are expected during renegotiation and
    /// teardown races; callers treat this as per-message and continue.
    #[error("Candidate rejected: {message}")]
    CandidateRejected {
        /// Why the candidate was dropped.
        message: String,
    },

    /// The outbound counters could not be read this tick.
    #[error("Transport stats unavailable: {message}")]
    StatsUnavailable {
        /// Why the read failed.
        message: String,
    },

    /// The operation arrived after the transport was closed.
    #[error("Transport closed: {message}")]
    Closed {
        /// Which operation was refused.
        message: String,
    },
}

impl TransportError {
    /// Create a creation-failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Create an invalid-description error.
    pub fn invalid_description(message: impl Into<String>) -> Self {
        Self::InvalidDescription {
            message: message.into(),
        }
    }

    /// Create a candidate-rejected error.
    pub fn candidate_rejected(message: impl Into<String>) -> Self {
        Self::CandidateRejected {
            message: message.into(),
        }
    }

    /// Create a stats-unavailable error.
    pub fn stats_unavailable(message: impl Into<String>) -> Self {
        Self::StatsUnavailable {
            message: message.into(),
        }
    }

    /// Create a transport-closed error.
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Whether this error means the transport never came up at all.
    pub fn is_creation_failure(&self) -> bool {
        matches!(self, TransportError::CreationFailed { .. })
    }
}
