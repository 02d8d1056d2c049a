//! Scriptable in-process devices and transport.
//!
//! These stand-ins let the call layer run end-to-end without any real capture
//! hardware or network stack: acquisition failures are switchable, outbound
//! counters replay a script (or ramp on their own), and remote media "arrives"
//! as soon as the handshake completes. Tests drive the interesting paths
//! deterministically; demos just let the defaults run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use televisit_signaling_core::{IceCandidate, SessionDescription, SessionId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::devices::MediaDevices;
use crate::error::{MediaError, MediaResult, TransportError, TransportResult};
use crate::stats::TransportStats;
use crate::track::{LocalMedia, MediaTrack, TrackKind};
use crate::transport::{PeerTransport, PeerTransportFactory, TransportConfig, TransportEvent};

/// How many bytes the auto-generated counters grow per stats read.
///
/// 60 kB over a 2 s sampling interval is roughly 240 kbps, comfortably above
/// the downgrade floor, so an unscripted link reads as healthy.
const AUTO_BYTES_PER_READ: u64 = 60_000;

/// Packets added per auto-generated stats read.
const AUTO_PACKETS_PER_READ: u64 = 50;

/// Capture devices whose availability is a pair of switches.
#[derive(Debug, Default)]
pub struct SimulatedMediaDevices {
    fail_audio: AtomicBool,
    fail_video: AtomicBool,
}

impl SimulatedMediaDevices {
    /// Create devices with both microphone and camera available.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make camera acquisition fail (or succeed again).
    pub fn set_fail_video(&self, fail: bool) {
        self.fail_video.store(fail, Ordering::SeqCst);
    }

    /// Make microphone acquisition fail (or succeed again).
    pub fn set_fail_audio(&self, fail: bool) {
        self.fail_audio.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaDevices for SimulatedMediaDevices {
    async fn acquire(&self, want_video: bool) -> MediaResult<LocalMedia> {
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(MediaError::device_unavailable("no microphone available"));
        }
        if want_video && self.fail_video.load(Ordering::SeqCst) {
            return Err(MediaError::device_unavailable("no camera available"));
        }
        let mut tracks = vec![MediaTrack::new(TrackKind::Audio)];
        if want_video {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        Ok(LocalMedia::new(tracks))
    }

    async fn acquire_camera_track(&self) -> MediaResult<MediaTrack> {
        if self.fail_video.load(Ordering::SeqCst) {
            return Err(MediaError::device_unavailable("no camera available"));
        }
        Ok(MediaTrack::new(TrackKind::Video))
    }
}

/// Scriptable stand-in for a real peer transport.
///
/// Descriptions are synthesized text, candidates are generated when a local
/// description is installed, and the outbound counters come from a script
/// pushed by the test (falling back to a healthy auto-ramp when the script is
/// empty and auto-stats are on).
pub struct SimulatedPeerTransport {
    session: SessionId,
    traversal_servers: Vec<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    senders: Mutex<Vec<MediaTrack>>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    remote_description_sets: AtomicUsize,
    applied_candidates: Mutex<Vec<IceCandidate>>,
    reject_candidates: AtomicBool,
    stats_script: Mutex<VecDeque<TransportStats>>,
    generated: Mutex<TransportStats>,
    auto_stats: AtomicBool,
    auto_remote_media: bool,
    remote_media_emitted: AtomicBool,
    closed: AtomicBool,
    rng: Mutex<SmallRng>,
}

impl SimulatedPeerTransport {
    fn new(
        session: SessionId,
        config: &TransportConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
        auto_remote_media: bool,
    ) -> Self {
        Self {
            session,
            traversal_servers: config.traversal_servers.clone(),
            events,
            senders: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            remote_description_sets: AtomicUsize::new(0),
            applied_candidates: Mutex::new(Vec::new()),
            reject_candidates: AtomicBool::new(false),
            stats_script: Mutex::new(VecDeque::new()),
            generated: Mutex::new(TransportStats::default()),
            auto_stats: AtomicBool::new(true),
            auto_remote_media,
            remote_media_emitted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Queue one scripted stats reading; scripted readings are returned
    /// before any auto-generated ones.
    pub fn push_stats(&self, stats: TransportStats) {
        self.stats_script.lock().push_back(stats);
    }

    /// Turn the auto-generated stats ramp on or off.
    ///
    /// With the ramp off and the script empty, stats reads fail, which is how
    /// tests exercise the skip-a-tick path.
    pub fn set_auto_stats(&self, auto: bool) {
        self.auto_stats.store(auto, Ordering::SeqCst);
    }

    /// Make candidate application fail (or succeed again).
    pub fn set_reject_candidates(&self, reject: bool) {
        self.reject_candidates.store(reject, Ordering::SeqCst);
    }

    /// Deliver a remote track to the owning session.
    pub fn emit_remote_track(&self, track: MediaTrack) {
        let _ = self.events.send(TransportEvent::RemoteTrack { track });
    }

    /// Tracks added to the outbound side so far.
    pub fn sender_tracks(&self) -> Vec<MediaTrack> {
        self.senders.lock().clone()
    }

    /// Candidates successfully applied, in arrival order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.applied_candidates.lock().clone()
    }

    /// The installed local description, if any.
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    /// The installed remote description, if any.
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    /// How many times a remote description was installed.
    pub fn remote_description_count(&self) -> usize {
        self.remote_description_sets.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Traversal servers this transport was created with.
    pub fn traversal_servers(&self) -> &[String] {
        &self.traversal_servers
    }

    fn ensure_open(&self, operation: &str) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::closed(operation.to_string()))
        } else {
            Ok(())
        }
    }

    fn video_sending(&self) -> bool {
        self.senders
            .lock()
            .iter()
            .any(|t| t.kind() == TrackKind::Video && t.is_live() && t.is_enabled())
    }
}

#[async_trait]
impl PeerTransport for SimulatedPeerTransport {
    async fn add_track(&self, track: MediaTrack) -> TransportResult<()> {
        self.ensure_open("add_track")?;
        debug!("sim transport {}: adding {} sender", self.session, track.kind());
        self.senders.lock().push(track);
        Ok(())
    }

    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        self.ensure_open("create_offer")?;
        Ok(SessionDescription::offer(format!("v=0 sim {} offer", self.session)))
    }

    async fn create_answer(&self) -> TransportResult<SessionDescription> {
        self.ensure_open("create_answer")?;
        Ok(SessionDescription::answer(format!("v=0 sim {} answer", self.session)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> TransportResult<()> {
        self.ensure_open("set_local_description")?;
        *self.local_description.lock() = Some(description);
        // local candidates start flowing once a local description exists
        let candidate = IceCandidate {
            candidate: format!("candidate:sim 1 udp 2122260223 {} 49152 typ host", self.session),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let _ = self.events.send(TransportEvent::LocalCandidate { candidate });
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> TransportResult<()> {
        self.ensure_open("set_remote_description")?;
        *self.remote_description.lock() = Some(description);
        self.remote_description_sets.fetch_add(1, Ordering::SeqCst);
        if self.auto_remote_media && !self.remote_media_emitted.swap(true, Ordering::SeqCst) {
            debug!("sim transport {}: remote media arriving", self.session);
            self.emit_remote_track(MediaTrack::new(TrackKind::Audio));
            self.emit_remote_track(MediaTrack::new(TrackKind::Video));
        }
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.remote_description.lock().is_some()
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> TransportResult<()> {
        self.ensure_open("add_candidate")?;
        if self.reject_candidates.load(Ordering::SeqCst) {
            return Err(TransportError::candidate_rejected("scripted rejection"));
        }
        self.applied_candidates.lock().push(candidate);
        Ok(())
    }

    async fn outbound_stats(&self) -> TransportResult<TransportStats> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::stats_unavailable("transport closed"));
        }
        if let Some(scripted) = self.stats_script.lock().pop_front() {
            return Ok(scripted);
        }
        if !self.auto_stats.load(Ordering::SeqCst) {
            return Err(TransportError::stats_unavailable("stats script exhausted"));
        }
        let jitter = self.rng.lock().gen_range(0..8_000u64);
        let mut generated = self.generated.lock();
        generated.bytes_sent += AUTO_BYTES_PER_READ + jitter;
        generated.packets_sent += AUTO_PACKETS_PER_READ;
        generated.frames_per_second = if self.video_sending() { 30.0 } else { 0.0 };
        Ok(*generated)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("sim transport {}: closed", self.session);
        }
    }
}

/// Factory producing [`SimulatedPeerTransport`]s and remembering them for
/// inspection.
#[derive(Default)]
pub struct SimulatedTransportFactory {
    created: Mutex<Vec<Arc<SimulatedPeerTransport>>>,
    fail_create: AtomicBool,
    auto_remote_media: AtomicBool,
}

impl SimulatedTransportFactory {
    /// Create a factory with automatic remote media delivery on.
    pub fn new() -> Arc<Self> {
        let factory = Self::default();
        factory.auto_remote_media.store(true, Ordering::SeqCst);
        Arc::new(factory)
    }

    /// Make transport creation fail (or succeed again).
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Control whether new transports emit remote tracks on handshake.
    ///
    /// Turn this off to model a callee that never answers with media.
    pub fn set_auto_remote_media(&self, auto: bool) {
        self.auto_remote_media.store(auto, Ordering::SeqCst);
    }

    /// Every transport created so far.
    pub fn transports(&self) -> Vec<Arc<SimulatedPeerTransport>> {
        self.created.lock().clone()
    }

    /// The transport created for `session`, if any.
    pub fn transport_for(&self, session: &SessionId) -> Option<Arc<SimulatedPeerTransport>> {
        self.created
            .lock()
            .iter()
            .find(|t| &t.session == session)
            .cloned()
    }
}

#[async_trait]
impl PeerTransportFactory for SimulatedTransportFactory {
    async fn create(
        &self,
        session: &SessionId,
        config: &TransportConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportResult<Arc<dyn PeerTransport>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TransportError::creation_failed("transport construction disabled"));
        }
        let transport = Arc::new(SimulatedPeerTransport::new(
            session.clone(),
            config,
            events,
            self.auto_remote_media.load(Ordering::SeqCst),
        ));
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DEFAULT_TRAVERSAL_SERVER;

    fn transport_pair() -> (Arc<SimulatedPeerTransport>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(SimulatedPeerTransport::new(
            SessionId::new("call-t"),
            &TransportConfig::default(),
            tx,
            true,
        ));
        (transport, rx)
    }

    #[tokio::test]
    async fn video_acquisition_fails_as_a_whole_when_camera_is_missing() {
        let devices = SimulatedMediaDevices::new();
        devices.set_fail_video(true);

        let err = devices.acquire(true).await.unwrap_err();
        assert!(matches!(err, MediaError::DeviceUnavailable { .. }));

        let media = devices.acquire(false).await.unwrap();
        assert!(media.audio_track().is_some());
        assert!(media.live_video_track().is_none());
    }

    #[tokio::test]
    async fn local_description_triggers_candidate_gathering() {
        let (transport, mut events) = transport_pair();
        let offer = transport.create_offer().await.unwrap();
        transport.set_local_description(offer).await.unwrap();

        match events.try_recv().unwrap() {
            TransportEvent::LocalCandidate { candidate } => {
                assert!(candidate.candidate.starts_with("candidate:"));
            }
            other => panic!("expected a candidate event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_media_arrives_once_per_handshake() {
        let (transport, mut events) = transport_pair();
        transport
            .set_remote_description(SessionDescription::offer("v=0"))
            .await
            .unwrap();
        transport
            .set_remote_description(SessionDescription::answer("v=0 again"))
            .await
            .unwrap();

        let mut remote_tracks = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TransportEvent::RemoteTrack { .. }) {
                remote_tracks += 1;
            }
        }
        assert_eq!(remote_tracks, 2, "audio and video once, no repeat on re-negotiation");
        assert_eq!(transport.remote_description_count(), 2);
    }

    #[tokio::test]
    async fn scripted_stats_are_replayed_before_the_auto_ramp() {
        let (transport, _events) = transport_pair();
        transport.push_stats(TransportStats::new(1, 2, 3, 4.0));

        assert_eq!(transport.outbound_stats().await.unwrap(), TransportStats::new(1, 2, 3, 4.0));

        let generated = transport.outbound_stats().await.unwrap();
        assert!(generated.bytes_sent >= AUTO_BYTES_PER_READ);

        transport.set_auto_stats(false);
        assert!(transport.outbound_stats().await.is_err());
    }

    #[tokio::test]
    async fn rejected_candidates_surface_as_errors() {
        let (transport, _events) = transport_pair();
        transport.set_reject_candidates(true);
        let err = transport.add_candidate(IceCandidate::new("c")).await.unwrap_err();
        assert!(matches!(err, TransportError::CandidateRejected { .. }));
        assert!(transport.applied_candidates().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_stats() {
        let (transport, _events) = transport_pair();
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert!(transport.outbound_stats().await.is_err());
    }

    #[tokio::test]
    async fn factory_remembers_transports_by_session() {
        let factory = SimulatedTransportFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = SessionId::new("call-f");
        factory
            .create(&session, &TransportConfig::default(), tx)
            .await
            .unwrap();

        assert!(factory.transport_for(&session).is_some());
        assert_eq!(factory.transports().len(), 1);
        assert_eq!(
            factory.transport_for(&session).unwrap().traversal_servers(),
            [DEFAULT_TRAVERSAL_SERVER]
        );
    }

    #[tokio::test]
    async fn creation_failure_is_scriptable() {
        let factory = SimulatedTransportFactory::new();
        factory.set_fail_create(true);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = factory
            .create(&SessionId::new("call-x"), &TransportConfig::default(), tx)
            .await
            .unwrap_err();
        assert!(err.is_creation_failure());
    }
}
