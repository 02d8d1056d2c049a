//! # televisit-signaling-core
//!
//! Session identifiers, description/candidate shapes, and the mailbox-style
//! [`SignalingChannel`] abstraction used to bootstrap a call between two
//! endpoints.
//!
//! ## Design
//!
//! Signaling here is deliberately thin: an ordered, at-least-once mailbox per
//! session id, carrying a three-variant tagged message. The call layer drains
//! its mailbox on a fixed poll and applies messages in arrival order, so any
//! transport that preserves per-session order can back the trait.
//!
//! The provided [`InMemorySignalingChannel`] links two endpoints in one
//! process, which is enough for tests, demos, and single-host deployments.
//!
//! ## Quick Start
//!
//! ```rust
//! use televisit_signaling_core::{
//!     InMemorySignalingChannel, SessionDescription, SessionId, SignalingChannel,
//!     SignalingMessage,
//! };
//!
//! # async fn example() -> Result<(), televisit_signaling_core::SignalingError> {
//! let (doctor, patient) = InMemorySignalingChannel::pair();
//! let session = SessionId::new("call-apt-12-demo");
//!
//! doctor
//!     .send(&session, SignalingMessage::offer(SessionDescription::offer("v=0")))
//!     .await?;
//!
//! let queued = patient.receive(&session).await?;
//! assert_eq!(queued.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod channel;
pub mod memory;
pub mod message;
pub mod types;

pub use channel::{SignalingChannel, SignalingError, SignalingResult};
pub use memory::InMemorySignalingChannel;
pub use message::SignalingMessage;
pub use types::{IceCandidate, SdpKind, SessionDescription, SessionId};
