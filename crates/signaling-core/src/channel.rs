//! Signaling channel abstraction.
//!
//! A call session never talks to a transport directly; it sends and receives
//! [`SignalingMessage`]s through a [`SignalingChannel`]. Swapping the channel
//! implementation (in-memory, WebSocket, broker) never touches the call state
//! machine.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::SignalingMessage;
use crate::types::SessionId;

/// Result type for signaling operations.
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Errors surfaced by a signaling channel implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// The channel can no longer deliver messages.
    #[error("Signaling channel closed: {message}")]
    ChannelClosed {
        /// What closed it.
        message: String,
    },

    /// A message could not be queued for the remote endpoint.
    #[error("Signaling send failed: {message}")]
    SendFailed {
        /// Transport-specific failure detail.
        message: String,
    },

    /// Queued messages could not be fetched.
    #[error("Signaling receive failed: {message}")]
    ReceiveFailed {
        /// Transport-specific failure detail.
        message: String,
    },
}

impl SignalingError {
    /// Create a channel-closed error.
    pub fn channel_closed(message: impl Into<String>) -> Self {
        Self::ChannelClosed {
            message: message.into(),
        }
    }

    /// Create a send-failed error.
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
        }
    }

    /// Create a receive-failed error.
    pub fn receive_failed(message: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            message: message.into(),
        }
    }
}

/// Ordered, at-least-once mailbox connecting the two endpoints of a call.
///
/// `send` addresses the remote endpoint's mailbox for `session`; `receive`
/// drains the local mailbox. Implementations must preserve per-session
/// enqueue order (FIFO); duplicate delivery is tolerated by the consumer, so
/// at-least-once semantics are sufficient.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Queue a message for the remote endpoint of `session`.
    async fn send(&self, session: &SessionId, message: SignalingMessage) -> SignalingResult<()>;

    /// Take every message currently queued for `session`, oldest first.
    ///
    /// Returns an empty vector when nothing is pending; that is not an error.
    async fn receive(&self, session: &SessionId) -> SignalingResult<Vec<SignalingMessage>>;
}
