//! The signaling wire shape.

use serde::{Deserialize, Serialize};

use crate::types::{IceCandidate, SessionDescription};

/// One message in a session's signaling mailbox.
///
/// This is the only wire surface of the call core. The serialized form is a
/// tagged JSON object (`{"type": "offer", ...}`), so any ordered transport
/// (WebSocket, message broker, polling store) can carry it unchanged.
///
/// Within one mailbox, order of delivery matters: an offer precedes the
/// answer logically, and candidates may interleave after their description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// The initiating side's session description.
    Offer {
        /// The offer description.
        offer: SessionDescription,
    },
    /// The answering side's session description.
    Answer {
        /// The answer description.
        answer: SessionDescription,
    },
    /// A network-path candidate from either side.
    Candidate {
        /// The candidate payload.
        candidate: IceCandidate,
    },
}

impl SignalingMessage {
    /// Wrap an offer description.
    pub fn offer(offer: SessionDescription) -> Self {
        Self::Offer { offer }
    }

    /// Wrap an answer description.
    pub fn answer(answer: SessionDescription) -> Self {
        Self::Answer { answer }
    }

    /// Wrap a candidate.
    pub fn candidate(candidate: IceCandidate) -> Self {
        Self::Candidate { candidate }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
        }
    }
}
