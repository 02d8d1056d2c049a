//! Peer transport abstraction.
//!
//! The transport is the point-to-point object that actually moves media
//! between the two call endpoints. The session layer owns exactly one
//! transport per call and drives it through this trait, so a real stack and
//! the simulated one are interchangeable.
//!
//! Out-of-band happenings (remote tracks arriving, local candidates being
//! discovered) are not delivered through callbacks: the transport pushes
//! [`TransportEvent`]s into a channel handed over at creation, and the
//! session applies them inside its own periodic drain. All state mutation
//! stays in one place that way.

use std::sync::Arc;

use async_trait::async_trait;
use televisit_signaling_core::{IceCandidate, SessionDescription, SessionId};
use tokio::sync::mpsc;

use crate::error::TransportResult;
use crate::stats::TransportStats;
use crate::track::MediaTrack;

/// Default public traversal helper used when no servers are configured.
pub const DEFAULT_TRAVERSAL_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration for creating a peer transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Network-traversal helper services (STUN/TURN URLs), tried in order.
    pub traversal_servers: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            traversal_servers: vec![DEFAULT_TRAVERSAL_SERVER.to_string()],
        }
    }
}

/// Out-of-band happenings reported by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A remote track started arriving.
    RemoteTrack {
        /// Handle to the received track.
        track: MediaTrack,
    },
    /// The local side discovered a network-path candidate to share.
    LocalCandidate {
        /// The candidate to forward over signaling.
        candidate: IceCandidate,
    },
}

/// Point-to-point media transport for one session.
///
/// All methods may be called concurrently from the session's periodic tasks;
/// implementations keep their own interior state consistent. `close` must be
/// idempotent.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Add a local track to the outbound side.
    async fn add_track(&self, track: MediaTrack) -> TransportResult<()>;

    /// Produce the local offer description.
    async fn create_offer(&self) -> TransportResult<SessionDescription>;

    /// Produce the local answer description for a received offer.
    async fn create_answer(&self) -> TransportResult<SessionDescription>;

    /// Install the local description.
    async fn set_local_description(&self, description: SessionDescription) -> TransportResult<()>;

    /// Install the remote description.
    async fn set_remote_description(&self, description: SessionDescription) -> TransportResult<()>;

    /// Whether a remote description has been installed.
    async fn has_remote_description(&self) -> bool;

    /// Apply a remote network-path candidate.
    async fn add_candidate(&self, candidate: IceCandidate) -> TransportResult<()>;

    /// Read cumulative outbound counters.
    async fn outbound_stats(&self) -> TransportResult<TransportStats>;

    /// Close the transport and release its senders. Idempotent.
    async fn close(&self);
}

impl std::fmt::Debug for dyn PeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PeerTransport")
    }
}

/// Creates transports bound to a session's event channel.
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    /// Create a transport for `session`, delivering its events to `events`.
    ///
    /// A creation failure is fatal to the session that requested it.
    async fn create(
        &self,
        session: &SessionId,
        config: &TransportConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportResult<Arc<dyn PeerTransport>>;
}
