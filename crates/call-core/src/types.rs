//! Core call types: phases, roles, invites, and snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use televisit_signaling_core::SessionId;

use crate::monitor::QualitySample;

/// Which side of the call this endpoint is.
///
/// The caller creates the offer; the callee answers it. Everything else
/// (media, monitoring, teardown) is symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    /// This endpoint initiated the call
    Caller,
    /// This endpoint was invited
    Callee,
}

/// The kind of call being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Audio and video
    Video,
    /// Audio only
    Audio,
}

impl CallType {
    /// Whether this call type asks for a camera track up front.
    pub fn wants_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Lifecycle phase of a call session.
///
/// Phases only move forward: `Ringing` becomes `Active` or `Declined`,
/// `Active` becomes `Ended`. The terminal phases absorb every further
/// transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    /// Invite delivered, not yet answered
    Ringing,
    /// Media flowing between both sides
    Active,
    /// Hung up after being active
    Ended,
    /// Rejected while ringing
    Declined,
}

impl CallPhase {
    /// Whether this phase admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Declined)
    }

    /// Whether the lifecycle permits moving from this phase to `next`.
    pub fn can_transition_to(&self, next: CallPhase) -> bool {
        matches!(
            (self, next),
            (Self::Ringing, CallPhase::Active)
                | (Self::Ringing, CallPhase::Declined)
                | (Self::Active, CallPhase::Ended)
        )
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ringing => write!(f, "ringing"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
            Self::Declined => write!(f, "declined"),
        }
    }
}

/// A person on one side of an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Display name
    pub name: String,
    /// Professional title, if any ("MD", "RN", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Participant {
    /// Create a participant without a title
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), title: None }
    }

    /// Create a participant with a title
    pub fn with_title(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self { name: name.into(), title: Some(title.into()) }
    }
}

/// An incoming call discovered on an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    /// The appointment the call belongs to
    pub appointment_id: String,
    /// Session id assigned by the calling side
    pub session_id: SessionId,
    /// Whether the caller wants video
    pub call_type: CallType,
    /// Who is calling
    pub from: Participant,
    /// When the caller started the call
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of a call session, safe to hand to UI code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    /// Session id
    pub session_id: SessionId,
    /// Current lifecycle phase
    pub phase: CallPhase,
    /// Which side of the call this endpoint is
    pub role: CallRole,
    /// Whether video was requested when the call was placed
    pub wants_video: bool,
    /// Whether the session is currently running without outbound video
    pub audio_only: bool,
    /// Whether the microphone is muted
    pub muted: bool,
    /// Whether the camera is on
    pub camera_on: bool,
    /// Number of local capture tracks
    pub local_tracks: usize,
    /// Number of remote tracks received
    pub remote_tracks: usize,
    /// Seconds spent in the active phase so far
    pub elapsed_seconds: u64,
    /// Most recent quality sample, if the monitor has produced one
    pub latest_quality: Option<QualitySample>,
}

/// Format elapsed call time as `mm:ss`.
///
/// Minutes keep counting past the hour, so a 90 minute call reads `90:00`
/// rather than rolling over.
pub fn format_call_timer(elapsed_seconds: u64) -> String {
    format!("{:02}:{:02}", elapsed_seconds / 60, elapsed_seconds % 60)
}
