//! Capture device abstraction.

use async_trait::async_trait;

use crate::error::MediaResult;
use crate::track::{LocalMedia, MediaTrack};

/// Access to local capture devices.
///
/// Acquisition is all-or-nothing per call: requesting microphone and camera
/// together fails as a whole if either device is refused, matching how
/// platform capture APIs behave. The caller decides whether to retry with
/// reduced constraints (the session layer falls back to audio-only).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a microphone track, and a camera track when `want_video`.
    async fn acquire(&self, want_video: bool) -> MediaResult<LocalMedia>;

    /// Acquire a standalone camera track.
    ///
    /// Used for manual camera recovery after a downgrade, when the original
    /// video track has been permanently stopped.
    async fn acquire_camera_track(&self) -> MediaResult<MediaTrack>;
}
