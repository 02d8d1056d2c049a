//! Media capture and peer transport abstractions for televisit calls.
//!
//! This crate defines the seams between call orchestration and the media
//! machinery underneath it:
//!
//! - [`MediaDevices`] hands out local capture tracks (microphone, camera)
//! - [`PeerTransport`] carries those tracks to the far side and reports
//!   outbound delivery counters
//! - [`TransportEvent`] surfaces what the transport does on its own time,
//!   remote tracks arriving and local candidates being gathered
//!
//! # Architecture
//!
//! ```text
//! +----------------+     acquire()      +------------------+
//! |  MediaDevices  | -----------------> |    LocalMedia    |
//! +----------------+                    | (audio [+video]) |
//!                                       +---------+--------+
//!                                                 | add_track()
//!                                                 v
//! +----------------+    TransportEvent  +------------------+
//! |  call layer    | <----------------- |  PeerTransport   |
//! +----------------+   (mpsc channel)   +------------------+
//! ```
//!
//! Everything here is trait-shaped so the call layer can run against real
//! device and network stacks in production and against the scriptable
//! stand-ins in [`simulated`] (behind the `simulated` feature) everywhere
//! else.

#![warn(missing_docs)]

pub mod devices;
pub mod error;
pub mod stats;
pub mod track;
pub mod transport;

#[cfg(feature = "simulated")]
pub mod simulated;

pub use devices::MediaDevices;
pub use error::{MediaError, MediaResult, TransportError, TransportResult};
pub use stats::TransportStats;
pub use track::{LocalMedia, MediaTrack, RemoteMedia, TrackKind};
pub use transport::{
    DEFAULT_TRAVERSAL_SERVER, PeerTransport, PeerTransportFactory, TransportConfig, TransportEvent,
};

#[cfg(feature = "simulated")]
pub use simulated::{SimulatedMediaDevices, SimulatedPeerTransport, SimulatedTransportFactory};
