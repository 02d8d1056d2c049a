//! # televisit-call-core
//!
//! Adaptive call session management for televisit appointments.
//!
//! This crate orchestrates one-to-one telehealth calls end to end: placing
//! and answering calls against an appointment registry, exchanging session
//! descriptions and candidates over a queued signaling channel, and watching
//! outbound quality while the call runs. When quality stays poor past a
//! grace period, the session downgrades itself to audio-only rather than
//! limping along with frozen video.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                         CallManager                           |
//! |  place_call / open_invite / events / incoming-call watcher    |
//! +-------------------------------+-------------------------------+
//!                                 |
//!                   +-------------v-------------+
//!                   |        CallSession        |
//!                   |  phase machine, controls  |
//!                   |  signaling + monitor task |
//!                   +--+---------+---------+----+
//!                      |         |         |
//!            +---------v--+ +----v-----+ +-v----------+
//!            | Signaling  | |  Media   | |Appointment |
//!            | Channel    | | Devices/ | | Registry   |
//!            | (queued)   | | Transport| | (patched)  |
//!            +------------+ +----------+ +------------+
//! ```
//!
//! The three seams at the bottom are traits from this crate and its
//! companions, so the same orchestration runs against a production stack or
//! against the scriptable stand-ins in `televisit-media-core`'s `simulated`
//! feature.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use televisit_call_core::{CallEvent, CallManager, CallType};
//!
//! # async fn example(manager: std::sync::Arc<CallManager>) -> anyhow::Result<()> {
//! let mut events = manager.events();
//!
//! let session = manager.place_call("apt-100", CallType::Video).await?;
//! session.accept().await?;
//!
//! while let Some(Ok(event)) = events.next().await {
//!     match event {
//!         CallEvent::Downgraded { session_id, sample } => {
//!             println!("{session_id} dropped to audio-only at {} kbps", sample.bitrate_kbps);
//!         }
//!         CallEvent::PhaseChanged { phase, .. } if phase.is_terminal() => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod session;
pub mod types;

pub use config::{CallConfig, MonitorConfig, RingingPolicy};
pub use error::{CallError, CallResult};
pub use events::{CallAction, CallEvent, EventEmitter, EventStream, IncomingCallHandler};
pub use manager::CallManager;
pub use monitor::QualitySample;
pub use registry::{
    ActiveCall, AppointmentId, AppointmentRecord, AppointmentRegistry, AppointmentStatus,
    InMemoryAppointmentRegistry, RegistryError, RegistryResult,
};
pub use session::CallSession;
pub use types::{
    CallInvite, CallPhase, CallRole, CallSnapshot, CallType, Participant, format_call_timer,
};

// seam types applications hold or implement
pub use televisit_media_core::{
    LocalMedia, MediaDevices, MediaError, MediaTrack, PeerTransport, PeerTransportFactory,
    RemoteMedia, TrackKind, TransportConfig, TransportError, TransportEvent, TransportStats,
};
pub use televisit_signaling_core::{
    IceCandidate, InMemorySignalingChannel, SdpKind, SessionDescription, SessionId,
    SignalingChannel, SignalingError, SignalingMessage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
