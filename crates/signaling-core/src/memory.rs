//! In-process signaling for tests and demos.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::channel::{SignalingChannel, SignalingResult};
use crate::message::SignalingMessage;
use crate::types::SessionId;

type Mailboxes = Arc<DashMap<SessionId, VecDeque<SignalingMessage>>>;

/// One endpoint of an in-memory signaling link.
///
/// Endpoints are created in linked pairs: a message sent on one side lands in
/// the peer's mailbox for that session, so two call managers in one process
/// can complete a full offer/answer/candidate exchange. Mailboxes are keyed
/// by session id and keep strict enqueue order.
#[derive(Debug)]
pub struct InMemorySignalingChannel {
    inbox: Mailboxes,
    outbox: Mailboxes,
}

impl InMemorySignalingChannel {
    /// Create a linked pair of endpoints.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let left: Mailboxes = Arc::new(DashMap::new());
        let right: Mailboxes = Arc::new(DashMap::new());
        (
            Arc::new(Self {
                inbox: left.clone(),
                outbox: right.clone(),
            }),
            Arc::new(Self {
                inbox: right,
                outbox: left,
            }),
        )
    }

    /// Push a message straight into this endpoint's own mailbox.
    ///
    /// Test hook for playing the remote side without a second endpoint.
    pub fn inject(&self, session: &SessionId, message: SignalingMessage) {
        self.inbox
            .entry(session.clone())
            .or_default()
            .push_back(message);
    }

    /// Number of messages currently queued for `session` on this endpoint.
    pub fn pending(&self, session: &SessionId) -> usize {
        self.inbox.get(session).map(|queue| queue.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SignalingChannel for InMemorySignalingChannel {
    async fn send(&self, session: &SessionId, message: SignalingMessage) -> SignalingResult<()> {
        trace!("signaling {}: queueing {} for peer", session, message.kind());
        self.outbox
            .entry(session.clone())
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn receive(&self, session: &SessionId) -> SignalingResult<Vec<SignalingMessage>> {
        let drained = match self.inbox.get_mut(session) {
            Some(mut queue) => queue.drain(..).collect::<Vec<_>>(),
            None => Vec::new(),
        };
        if !drained.is_empty() {
            trace!("signaling {}: drained {} messages", session, drained.len());
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IceCandidate, SessionDescription};

    fn offer() -> SignalingMessage {
        SignalingMessage::offer(SessionDescription::offer("v=0 o"))
    }

    fn candidate(line: &str) -> SignalingMessage {
        SignalingMessage::candidate(IceCandidate::new(line))
    }

    #[tokio::test]
    async fn send_reaches_the_peer_not_the_sender() {
        let (alice, bob) = InMemorySignalingChannel::pair();
        let session = SessionId::new("call-1");

        alice.send(&session, offer()).await.unwrap();

        assert!(alice.receive(&session).await.unwrap().is_empty());
        let delivered = bob.receive(&session).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].kind(), "offer");
    }

    #[tokio::test]
    async fn messages_drain_in_fifo_order_across_partial_drains() {
        let (alice, bob) = InMemorySignalingChannel::pair();
        let session = SessionId::new("call-1");

        alice.send(&session, offer()).await.unwrap();
        let first = bob.receive(&session).await.unwrap();
        assert_eq!(first.iter().map(|m| m.kind()).collect::<Vec<_>>(), ["offer"]);

        alice.send(&session, candidate("cand-a")).await.unwrap();
        alice.send(&session, candidate("cand-b")).await.unwrap();
        let rest = bob.receive(&session).await.unwrap();
        let kinds: Vec<_> = rest
            .iter()
            .map(|m| match m {
                SignalingMessage::Candidate { candidate } => candidate.candidate.as_str(),
                other => other.kind(),
            })
            .collect();
        assert_eq!(kinds, ["cand-a", "cand-b"], "candidates must keep enqueue order");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (alice, bob) = InMemorySignalingChannel::pair();
        let one = SessionId::new("call-1");
        let two = SessionId::new("call-2");

        alice.send(&one, offer()).await.unwrap();

        assert!(bob.receive(&two).await.unwrap().is_empty());
        assert_eq!(bob.pending(&one), 1);
    }

    #[tokio::test]
    async fn receive_on_unknown_session_is_empty_not_error() {
        let (_alice, bob) = InMemorySignalingChannel::pair();
        let session = SessionId::new("never-used");
        assert!(bob.receive(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inject_feeds_the_local_mailbox() {
        let (alice, _bob) = InMemorySignalingChannel::pair();
        let session = SessionId::new("call-1");

        alice.inject(&session, offer());

        let delivered = alice.receive(&session).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }
}
