//! Media track primitives.
//!
//! A [`MediaTrack`] is a cheap handle to shared track state, matching how a
//! capture track is visible both to the session that acquired it and to the
//! transport sending it: disabling or stopping through any handle is observed
//! by every holder.
//!
//! Two flags with very different lifetimes:
//! - `enabled` is the reversible switch behind mute and camera-off;
//! - `live` is one-way: a stopped track is permanently ended and can only be
//!   replaced by acquiring a new one.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a track carries audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone or remote voice.
    Audio,
    /// Camera or remote picture.
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Handle to a single audio or video stream unit.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl MediaTrack {
    /// Create a live, enabled track of the given kind.
    pub fn new(kind: TrackKind) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: format!("{}-{}", kind, Uuid::new_v4()),
                kind,
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
            }),
        }
    }

    /// Stable identifier of the underlying track.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Audio or video.
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Whether the track currently produces media.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Set the enabled flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the enabled flag, returning the new value.
    pub fn toggle_enabled(&self) -> bool {
        !self.inner.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Whether the track has not been stopped.
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Permanently end the track. Idempotent.
    pub fn stop(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
    }
}

/// The set of locally captured tracks for one session.
///
/// Owned exclusively by the session that acquired it; every track is stopped
/// on teardown. After a downgrade the stopped video track stays in the set
/// and a recovered camera is pushed alongside it, so lookups that matter go
/// through [`LocalMedia::live_video_track`].
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    tracks: Vec<MediaTrack>,
}

impl LocalMedia {
    /// Wrap acquired tracks.
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// All tracks, in acquisition order.
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// The first audio track, if any.
    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    /// The first video track that has not been stopped.
    pub fn live_video_track(&self) -> Option<&MediaTrack> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video && t.is_live())
    }

    /// Add a freshly acquired track.
    pub fn push(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// Stop every track. Idempotent.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Accumulating sink for tracks received from the remote party.
///
/// The first remote track creates the sink; later tracks attach to the same
/// sink, mirroring a single remote stream with audio and video sections.
#[derive(Debug, Clone, Default)]
pub struct RemoteMedia {
    tracks: Vec<MediaTrack>,
}

impl RemoteMedia {
    /// Attach a received track, ignoring duplicates by id.
    pub fn attach(&mut self, track: MediaTrack) {
        if self.tracks.iter().any(|t| t.id() == track.id()) {
            return;
        }
        self.tracks.push(track);
    }

    /// All attached tracks.
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Whether anything has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Stop every attached track. Idempotent.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
