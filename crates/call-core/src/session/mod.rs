//! Call session lifecycle and controls.
//!
//! A [`CallSession`] owns one call on one appointment: its lifecycle phase,
//! its local and remote media, its peer transport, and the background tasks
//! that keep signaling and quality monitoring running while the call is
//! active.
//!
//! # Lifecycle
//!
//! ```text
//!             accept / auto-advance
//!   Ringing ------------------------> Active
//!      |                                |
//!      | decline                        | hangup
//!      v                                v
//!   Declined                          Ended
//! ```
//!
//! Phases only move forward. `Declined` and `Ended` are terminal: once a
//! session reaches one of them, every further transition attempt is
//! absorbed, teardown has run, and the appointment registry no longer
//! carries the call.
//!
//! # Accepting
//!
//! `accept` does the heavy lifting: it acquires capture devices (falling
//! back to audio-only when the camera is unavailable), creates the peer
//! transport, attaches local tracks, sends the initial offer when this side
//! placed the call, and only then commits the transition to `Active` and
//! spawns the signaling and monitor tasks. A failed accept leaves the
//! session ringing so the user can retry or decline.
//!
//! # Degradation
//!
//! While active, the monitor task samples outbound transport counters every
//! couple of seconds. Sustained poor quality, after a grace period and only
//! once remote media has arrived, stops the outbound video track and drops
//! the session to audio-only. The downgrade happens at most once per call;
//! toggling the camera afterwards reacquires a fresh track instead of
//! re-enabling the stopped one.

mod tasks;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use televisit_media_core::{LocalMedia, PeerTransport, RemoteMedia, TransportConfig};
use televisit_signaling_core::{SessionId, SignalingMessage};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CallConfig, RingingPolicy};
use crate::error::{CallError, CallResult};
use crate::events::{CallEvent, EventEmitter};
use crate::manager::Collaborators;
use crate::monitor::{DowngradeTracker, QualitySample, SampleWindow};
use crate::types::{CallPhase, CallRole, CallSnapshot, CallType};

/// Mutable session state behind one lock.
struct SessionInner {
    phase: CallPhase,
    audio_only: bool,
    muted: bool,
    camera_on: bool,
    local_media: Option<LocalMedia>,
    remote_media: Option<RemoteMedia>,
    transport: Option<Arc<dyn PeerTransport>>,
    latest_sample: Option<QualitySample>,
    window: SampleWindow,
    tracker: DowngradeTracker,
    active_since: Option<Instant>,
    active_accumulated: Duration,
    torn_down: bool,
}

/// Everything a session needs at construction.
pub(crate) struct SessionParams {
    pub(crate) session_id: SessionId,
    pub(crate) appointment_id: String,
    pub(crate) role: CallRole,
    pub(crate) call_type: CallType,
    pub(crate) ringing_policy: RingingPolicy,
    pub(crate) config: CallConfig,
    pub(crate) collab: Arc<Collaborators>,
    pub(crate) events: EventEmitter,
}

/// One call on one appointment.
///
/// Created by the call manager; shared as `Arc<CallSession>` between the
/// application, the manager's session map, and the session's own background
/// tasks.
pub struct CallSession {
    session_id: SessionId,
    appointment_id: String,
    role: CallRole,
    call_type: CallType,
    ringing_policy: RingingPolicy,
    config: CallConfig,
    collab: Arc<Collaborators>,
    events: EventEmitter,
    inner: RwLock<SessionInner>,
    signaling_task: Mutex<Option<JoinHandle<()>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    ring_task: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("session_id", &self.session_id)
            .field("appointment_id", &self.appointment_id)
            .field("role", &self.role)
            .field("call_type", &self.call_type)
            .finish_non_exhaustive()
    }
}

impl CallSession {
    pub(crate) fn new(params: SessionParams) -> Arc<Self> {
        Arc::new(Self {
            session_id: params.session_id,
            appointment_id: params.appointment_id,
            role: params.role,
            call_type: params.call_type,
            ringing_policy: params.ringing_policy,
            config: params.config,
            collab: params.collab,
            events: params.events,
            inner: RwLock::new(SessionInner {
                phase: CallPhase::Ringing,
                // until video is actually flowing the session is audio-only
                audio_only: !params.call_type.wants_video(),
                muted: false,
                camera_on: false,
                local_media: None,
                remote_media: None,
                transport: None,
                latest_sample: None,
                window: SampleWindow::new(),
                tracker: DowngradeTracker::new(),
                active_since: None,
                active_accumulated: Duration::ZERO,
                torn_down: false,
            }),
            signaling_task: Mutex::new(None),
            monitor_task: Mutex::new(None),
            ring_task: Mutex::new(None),
            accepting: AtomicBool::new(false),
        })
    }

    /// Arm any policy-driven behavior for the ringing phase.
    pub(crate) async fn start(self: &Arc<Self>) {
        if let RingingPolicy::AutoAdvance { after } = self.ringing_policy {
            let session = self.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if session.phase().await == CallPhase::Ringing {
                    info!("Session {}: auto-advancing out of ringing", session.session_id);
                    if let Err(e) = session.accept().await {
                        warn!("Session {}: auto-advance accept failed: {e}", session.session_id);
                    }
                }
            });
            *self.ring_task.lock().await = Some(handle);
        }
    }

    /// Session identifier
    pub fn id(&self) -> &SessionId {
        &self.session_id
    }

    /// Appointment this call belongs to
    pub fn appointment_id(&self) -> &str {
        &self.appointment_id
    }

    /// Which side of the call this endpoint is
    pub fn role(&self) -> CallRole {
        self.role
    }

    /// The call type requested when the call was placed
    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> CallPhase {
        self.inner.read().await.phase
    }

    /// Whether the session is running without outbound video
    pub async fn is_audio_only(&self) -> bool {
        self.inner.read().await.audio_only
    }

    /// Whether the microphone is muted
    pub async fn is_muted(&self) -> bool {
        self.inner.read().await.muted
    }

    /// Whether the camera is on
    pub async fn is_camera_on(&self) -> bool {
        self.inner.read().await.camera_on
    }

    /// Whether any remote track has arrived
    pub async fn has_remote_media(&self) -> bool {
        self.inner.read().await.remote_media.is_some()
    }

    /// Most recent quality sample, if the monitor has produced one
    pub async fn latest_quality(&self) -> Option<QualitySample> {
        self.inner.read().await.latest_sample
    }

    /// Time spent in the active phase so far.
    ///
    /// The clock starts on the transition to `Active` and freezes on the
    /// transition to `Ended`; ringing and teardown do not count.
    pub async fn elapsed(&self) -> Duration {
        Self::elapsed_of(&*self.inner.read().await)
    }

    /// [`elapsed`](Self::elapsed) in whole seconds, for display
    pub async fn elapsed_seconds(&self) -> u64 {
        self.elapsed().await.as_secs()
    }

    /// Point-in-time view of the whole session
    pub async fn snapshot(&self) -> CallSnapshot {
        let inner = self.inner.read().await;
        CallSnapshot {
            session_id: self.session_id.clone(),
            phase: inner.phase,
            role: self.role,
            wants_video: self.call_type.wants_video(),
            audio_only: inner.audio_only,
            muted: inner.muted,
            camera_on: inner.camera_on,
            local_tracks: inner.local_media.as_ref().map_or(0, |m| m.tracks().len()),
            remote_tracks: inner.remote_media.as_ref().map_or(0, |m| m.tracks().len()),
            elapsed_seconds: Self::elapsed_of(&inner).as_secs(),
            latest_quality: inner.latest_sample,
        }
    }

    fn elapsed_of(inner: &SessionInner) -> Duration {
        let running = inner.active_since.map(|since| since.elapsed()).unwrap_or_default();
        inner.active_accumulated + running
    }

    /// Answer the call and bring media up.
    ///
    /// Acquires devices, creates the transport, attaches tracks, sends the
    /// initial offer when this side is the caller, and moves the session to
    /// `Active`. Accepting an already active call is a no-op; accepting a
    /// terminal one is an error. On failure the session stays in `Ringing`.
    pub async fn accept(self: &Arc<Self>) -> CallResult<()> {
        {
            let inner = self.inner.read().await;
            match inner.phase {
                CallPhase::Ringing => {}
                CallPhase::Active => return Ok(()),
                phase => {
                    return Err(CallError::invalid_state(format!("cannot accept a {phase} call")));
                }
            }
        }
        // collapse concurrent accepts (double-tapped answer button) into one
        if self.accepting.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.activate().await;
        if result.is_err() {
            self.accepting.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn activate(self: &Arc<Self>) -> CallResult<()> {
        let want_video = self.call_type.wants_video();
        let (media, audio_only) = self.acquire_media(want_video).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport_config =
            TransportConfig { traversal_servers: self.config.traversal_servers.clone() };
        let transport = match self
            .collab
            .transports
            .create(&self.session_id, &transport_config, event_tx)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                media.stop_all();
                return Err(e.into());
            }
        };

        for track in media.tracks() {
            if let Err(e) = transport.add_track(track.clone()).await {
                media.stop_all();
                transport.close().await;
                return Err(e.into());
            }
        }

        if self.role == CallRole::Caller {
            if let Err(e) = self.send_initial_offer(&transport).await {
                media.stop_all();
                transport.close().await;
                return Err(e);
            }
        }

        {
            let mut inner = self.inner.write().await;
            if inner.phase != CallPhase::Ringing {
                // a decline raced the setup and won
                media.stop_all();
                transport.close().await;
                return Err(CallError::invalid_state("call ended while being accepted"));
            }
            inner.audio_only = audio_only;
            inner.camera_on = want_video && !audio_only;
            inner.muted = false;
            inner.local_media = Some(media);
            inner.transport = Some(transport);
            self.transition(&mut inner, CallPhase::Active);
        }

        if self.role == CallRole::Callee {
            // bookkeeping only; the call works even if the registry lags
            if let Err(e) = self
                .collab
                .registry
                .mark_call_answered(&self.appointment_id, &self.session_id)
                .await
            {
                warn!("Session {}: failed to record answer: {e}", self.session_id);
            }
        }

        self.spawn_tasks(event_rx).await;
        self.events
            .emit(CallEvent::LocalMediaReady { session_id: self.session_id.clone(), audio_only });
        Ok(())
    }

    /// Acquire capture devices, falling back to audio-only when the camera
    /// cannot be had. Returns the media and whether the fallback happened.
    async fn acquire_media(&self, want_video: bool) -> CallResult<(LocalMedia, bool)> {
        if want_video {
            match self.collab.devices.acquire(true).await {
                Ok(media) => return Ok((media, false)),
                Err(e) => {
                    warn!(
                        "Session {}: camera acquisition failed ({e}), retrying audio-only",
                        self.session_id
                    );
                }
            }
        }
        let media = self.collab.devices.acquire(false).await?;
        Ok((media, true))
    }

    async fn send_initial_offer(&self, transport: &Arc<dyn PeerTransport>) -> CallResult<()> {
        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        self.collab.signaling.send(&self.session_id, SignalingMessage::offer(offer)).await?;
        Ok(())
    }

    /// Reject a ringing call.
    ///
    /// Tears the session down and clears the call from the appointment.
    /// A no-op in any phase other than `Ringing` (declining twice is fine).
    pub async fn decline(&self) -> CallResult<()> {
        let should_teardown = {
            let mut inner = self.inner.write().await;
            match inner.phase {
                CallPhase::Ringing => {
                    self.transition(&mut inner, CallPhase::Declined);
                    info!("Session {}: declined", self.session_id);
                    true
                }
                CallPhase::Declined => true,
                _ => false,
            }
        };
        if should_teardown {
            self.teardown().await;
            self.clear_registry().await;
        }
        Ok(())
    }

    /// End an active call.
    ///
    /// Freezes the call clock, tears the session down, and clears the call
    /// from the appointment. A no-op in any phase other than `Active`.
    pub async fn hangup(&self) -> CallResult<()> {
        let should_teardown = {
            let mut inner = self.inner.write().await;
            match inner.phase {
                CallPhase::Active => {
                    self.transition(&mut inner, CallPhase::Ended);
                    info!(
                        "Session {}: hung up after {}s",
                        self.session_id,
                        Self::elapsed_of(&inner).as_secs()
                    );
                    true
                }
                CallPhase::Ended => true,
                _ => false,
            }
        };
        if should_teardown {
            self.teardown().await;
            self.clear_registry().await;
        }
        Ok(())
    }

    /// Toggle the microphone. Returns the new muted state.
    ///
    /// A no-op before local media exists; the reported state is unchanged.
    pub async fn toggle_mute(&self) -> CallResult<bool> {
        let mut inner = self.inner.write().await;
        let track = match inner.local_media.as_ref().and_then(|m| m.audio_track()) {
            Some(track) => track.clone(),
            None => {
                debug!("Session {}: mute toggled with no local media", self.session_id);
                return Ok(inner.muted);
            }
        };
        let enabled = track.toggle_enabled();
        inner.muted = !enabled;
        let muted = inner.muted;
        drop(inner);
        self.events.emit(CallEvent::MuteChanged { session_id: self.session_id.clone(), muted });
        Ok(muted)
    }

    /// Toggle the camera. Returns the new camera state.
    ///
    /// With a live video track this flips its enabled state. After a
    /// downgrade the stopped track cannot come back, so this reacquires a
    /// fresh camera track instead; state only changes if that succeeds.
    /// A no-op before local media exists.
    pub async fn toggle_camera(&self) -> CallResult<bool> {
        {
            let mut inner = self.inner.write().await;
            if inner.local_media.is_none() {
                debug!("Session {}: camera toggled with no local media", self.session_id);
                return Ok(inner.camera_on);
            }
            let live_video =
                inner.local_media.as_ref().and_then(|m| m.live_video_track()).cloned();
            if let Some(track) = live_video {
                let enabled = track.toggle_enabled();
                inner.camera_on = enabled;
                if enabled {
                    inner.audio_only = false;
                }
                let camera_on = inner.camera_on;
                drop(inner);
                self.events.emit(CallEvent::CameraChanged {
                    session_id: self.session_id.clone(),
                    camera_on,
                });
                return Ok(camera_on);
            }
        }
        self.reacquire_camera().await
    }

    /// Bring the camera back after a downgrade stopped the video track.
    async fn reacquire_camera(&self) -> CallResult<bool> {
        let camera = match self.collab.devices.acquire_camera_track().await {
            Ok(track) => track,
            Err(e) => {
                warn!("Session {}: camera reacquisition failed: {e}", self.session_id);
                return Ok(false);
            }
        };
        let transport = { self.inner.read().await.transport.clone() };
        let Some(transport) = transport else {
            camera.stop();
            return Ok(false);
        };
        if let Err(e) = transport.add_track(camera.clone()).await {
            warn!("Session {}: failed to attach reacquired camera: {e}", self.session_id);
            camera.stop();
            return Ok(false);
        }
        {
            let mut inner = self.inner.write().await;
            if inner.torn_down || inner.local_media.is_none() {
                camera.stop();
                return Ok(false);
            }
            if let Some(media) = inner.local_media.as_mut() {
                media.push(camera);
            }
            inner.camera_on = true;
            inner.audio_only = false;
        }
        info!("Session {}: camera recovered", self.session_id);
        self.events.emit(CallEvent::CameraRecovered { session_id: self.session_id.clone() });
        self.events
            .emit(CallEvent::CameraChanged { session_id: self.session_id.clone(), camera_on: true });
        Ok(true)
    }

    /// The single place phases change.
    ///
    /// Illegal transitions are absorbed silently, which is what makes the
    /// terminal phases sticky no matter who calls what in which order.
    fn transition(&self, inner: &mut SessionInner, next: CallPhase) {
        let previous = inner.phase;
        if previous == next || !previous.can_transition_to(next) {
            return;
        }
        inner.phase = next;
        if next == CallPhase::Active {
            inner.active_since = Some(Instant::now());
        } else if let Some(since) = inner.active_since.take() {
            inner.active_accumulated += since.elapsed();
        }
        debug!("Session {} phase: {previous:?} -> {next:?}", self.session_id);
        self.events.emit(CallEvent::PhaseChanged {
            session_id: self.session_id.clone(),
            previous,
            phase: next,
            timestamp: Utc::now(),
        });
    }

    /// Release everything the session holds.
    ///
    /// Aborts background tasks, stops every local and remote track, and
    /// closes the transport. Runs at most once; later calls return
    /// immediately. Every exit path (decline, hangup, manager shutdown)
    /// funnels through here.
    pub(crate) async fn teardown(&self) {
        for task in [&self.ring_task, &self.signaling_task, &self.monitor_task] {
            if let Some(handle) = task.lock().await.take() {
                handle.abort();
            }
        }
        let (media, remote, transport) = {
            let mut inner = self.inner.write().await;
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            (inner.local_media.take(), inner.remote_media.take(), inner.transport.take())
        };
        if let Some(media) = media {
            media.stop_all();
        }
        if let Some(remote) = remote {
            remote.stop_all();
        }
        if let Some(transport) = transport {
            transport.close().await;
        }
        debug!("Session {}: torn down", self.session_id);
    }

    async fn clear_registry(&self) {
        if let Err(e) = self.collab.registry.clear_call(&self.session_id).await {
            warn!("Session {}: failed to clear appointment call state: {e}", self.session_id);
        }
    }
}
