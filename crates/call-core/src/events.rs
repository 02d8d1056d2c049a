//! Call event system.
//!
//! Everything observable about a call, phase changes, media arrival, quality
//! reports, the downgrade itself, is published on a broadcast channel so UI
//! layers and tests can watch without holding locks into the session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use televisit_media_core::TrackKind;
use televisit_signaling_core::SessionId;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::monitor::QualitySample;
use crate::types::{CallInvite, CallPhase};

/// Stream of call events for async iteration
pub type EventStream = BroadcastStream<CallEvent>;

/// What to do with an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// Answer the call
    Accept,
    /// Reject the call
    Decline,
    /// Leave it ringing for someone else to answer
    Ignore,
}

/// Decides what happens when the watcher surfaces an incoming call.
///
/// The handler runs on the watcher task; answer quickly or hand the invite
/// off. Returning [`CallAction::Ignore`] leaves the session ringing so it
/// can be answered later through the manager.
#[async_trait]
pub trait IncomingCallHandler: Send + Sync {
    /// Called once per discovered invite.
    async fn on_incoming_call(&self, invite: &CallInvite) -> CallAction;
}

/// Events published by the call manager and its sessions.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// An incoming call was discovered on an appointment
    IncomingCall {
        /// The invite, including who is calling
        invite: CallInvite,
    },
    /// A session moved to a new lifecycle phase
    PhaseChanged {
        /// Which session
        session_id: SessionId,
        /// The phase it left
        previous: CallPhase,
        /// The phase it entered
        phase: CallPhase,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },
    /// Local capture tracks are acquired and attached
    LocalMediaReady {
        /// Which session
        session_id: SessionId,
        /// Whether the session came up without video
        audio_only: bool,
    },
    /// A track arrived from the far side
    RemoteTrackAdded {
        /// Which session
        session_id: SessionId,
        /// Audio or video
        kind: TrackKind,
    },
    /// The quality monitor produced a sample
    QualityReport {
        /// Which session
        session_id: SessionId,
        /// The sample
        sample: QualitySample,
    },
    /// Sustained poor quality forced the session to audio-only
    Downgraded {
        /// Which session
        session_id: SessionId,
        /// The sample that completed the poor streak
        sample: QualitySample,
    },
    /// The camera was reacquired after a downgrade
    CameraRecovered {
        /// Which session
        session_id: SessionId,
    },
    /// The microphone mute state was toggled
    MuteChanged {
        /// Which session
        session_id: SessionId,
        /// The new state
        muted: bool,
    },
    /// The camera enable state was toggled
    CameraChanged {
        /// Which session
        session_id: SessionId,
        /// The new state
        camera_on: bool,
    },
}

/// Broadcast-backed event publisher shared by the manager and its sessions.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<CallEvent>>,
}

impl EventEmitter {
    /// Create an emitter whose channel buffers up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender: Arc::new(sender) }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published with no subscribers are dropped silently; the
    /// session does not care whether anyone is watching.
    pub fn emit(&self, event: CallEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("event dropped, no subscribers: {e}");
        }
    }

    /// Subscribe to events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as an async stream.
    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.subscribe())
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_emitted_after_subscribing() {
        let emitter = EventEmitter::new(8);
        let mut rx = emitter.subscribe();

        emitter.emit(CallEvent::MuteChanged { session_id: SessionId::new("call-1"), muted: true });

        match rx.recv().await.unwrap() {
            CallEvent::MuteChanged { muted, .. } => assert!(muted),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn emitting_without_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(8);
        emitter.emit(CallEvent::CameraRecovered { session_id: SessionId::new("call-1") });
        assert_eq!(emitter.receiver_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let emitter = EventEmitter::new(8);
        let clone = emitter.clone();
        let mut rx = emitter.subscribe();

        clone.emit(CallEvent::CameraChanged {
            session_id: SessionId::new("call-2"),
            camera_on: false,
        });

        assert!(matches!(rx.recv().await.unwrap(), CallEvent::CameraChanged { camera_on: false, .. }));
    }
}
