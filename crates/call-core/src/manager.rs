//! Call manager.
//!
//! The [`CallManager`] is the application-facing entry point: it owns the
//! collaborator seams (signaling, devices, transports, registry), creates
//! call sessions for outgoing and incoming calls, watches the registry for
//! invites, and fans session events out to subscribers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use televisit_call_core::{
//!     CallConfig, CallManager, CallType, InMemoryAppointmentRegistry,
//! };
//! # use televisit_call_core::{MediaDevices, PeerTransportFactory};
//! # use televisit_signaling_core::InMemorySignalingChannel;
//!
//! # async fn example(
//! #     devices: Arc<dyn MediaDevices>,
//! #     transports: Arc<dyn PeerTransportFactory>,
//! # ) -> anyhow::Result<()> {
//! let registry = InMemoryAppointmentRegistry::new();
//! let (signaling, _peer) = InMemorySignalingChannel::pair();
//!
//! let manager = CallManager::new(
//!     CallConfig::default(),
//!     signaling,
//!     devices,
//!     transports,
//!     registry,
//!     None,
//! )?;
//! manager.start().await;
//!
//! let session = manager.place_call("apt-100", CallType::Video).await?;
//! session.accept().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use televisit_media_core::{MediaDevices, PeerTransportFactory};
use televisit_signaling_core::{SessionId, SignalingChannel};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::{CallConfig, RingingPolicy};
use crate::error::{CallError, CallResult};
use crate::events::{CallAction, CallEvent, EventEmitter, EventStream, IncomingCallHandler};
use crate::registry::{ActiveCall, AppointmentRegistry};
use crate::session::{CallSession, SessionParams};
use crate::types::{CallInvite, CallPhase, CallRole, CallType};

/// The seams a session needs to do its work, bundled so every session
/// shares one set.
pub(crate) struct Collaborators {
    pub(crate) signaling: Arc<dyn SignalingChannel>,
    pub(crate) devices: Arc<dyn MediaDevices>,
    pub(crate) transports: Arc<dyn PeerTransportFactory>,
    pub(crate) registry: Arc<dyn AppointmentRegistry>,
}

/// Creates and tracks call sessions for one endpoint.
pub struct CallManager {
    config: CallConfig,
    collab: Arc<Collaborators>,
    events: EventEmitter,
    sessions: DashMap<SessionId, Arc<CallSession>>,
    handler: Option<Arc<dyn IncomingCallHandler>>,
    watcher_task: Mutex<Option<JoinHandle<()>>>,
    seen_invites: DashMap<SessionId, ()>,
    is_running: AtomicBool,
}

impl std::fmt::Debug for CallManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallManager")
            .field("sessions", &self.sessions.len())
            .field("is_running", &self.is_running)
            .finish_non_exhaustive()
    }
}

impl CallManager {
    /// Create a manager over the given collaborators.
    ///
    /// `handler`, when present, decides incoming calls on the watcher task;
    /// without one, invites surface as [`CallEvent::IncomingCall`] and ring
    /// until answered through the manager.
    pub fn new(
        config: CallConfig,
        signaling: Arc<dyn SignalingChannel>,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn PeerTransportFactory>,
        registry: Arc<dyn AppointmentRegistry>,
        handler: Option<Arc<dyn IncomingCallHandler>>,
    ) -> CallResult<Arc<Self>> {
        config.validate()?;
        let events = EventEmitter::new(config.event_capacity);
        Ok(Arc::new(Self {
            config,
            collab: Arc::new(Collaborators { signaling, devices, transports, registry }),
            events,
            sessions: DashMap::new(),
            handler,
            watcher_task: Mutex::new(None),
            seen_invites: DashMap::new(),
            is_running: AtomicBool::new(false),
        }))
    }

    /// Start the manager and its incoming-call watcher.
    pub async fn start(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.watch_for_invites().await });
        *self.watcher_task.lock().await = Some(handle);
        info!("Call manager started");
    }

    /// Stop the manager, ending every call it tracks.
    ///
    /// Ringing sessions are declined, active ones hung up, so the registry
    /// is left clean on both counts.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.watcher_task.lock().await.take() {
            handle.abort();
        }
        let sessions: Vec<_> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for session in sessions {
            match session.phase().await {
                CallPhase::Ringing => {
                    if let Err(e) = session.decline().await {
                        warn!("Session {}: decline during shutdown failed: {e}", session.id());
                    }
                }
                CallPhase::Active => {
                    if let Err(e) = session.hangup().await {
                        warn!("Session {}: hangup during shutdown failed: {e}", session.id());
                    }
                }
                _ => session.teardown().await,
            }
        }
        self.sessions.clear();
        info!("Call manager stopped");
    }

    /// Subscribe to call events as a stream.
    pub fn events(&self) -> EventStream {
        self.events.stream()
    }

    /// Subscribe to call events on the raw broadcast channel.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Place a call on an appointment.
    ///
    /// Stamps the call onto the appointment record so the far side can
    /// discover it, then returns the new ringing session. Accept the
    /// session (or configure auto-advance) to bring media up.
    pub async fn place_call(
        &self,
        appointment_id: &str,
        call_type: CallType,
    ) -> CallResult<Arc<CallSession>> {
        self.ensure_running()?;
        if self.collab.registry.get(appointment_id).await?.is_none() {
            return Err(CallError::appointment_not_found(appointment_id));
        }
        let session_id = SessionId::generate(appointment_id);
        let session = CallSession::new(SessionParams {
            session_id: session_id.clone(),
            appointment_id: appointment_id.to_string(),
            role: CallRole::Caller,
            call_type,
            ringing_policy: self.config.ringing_policy,
            config: self.config.clone(),
            collab: self.collab.clone(),
            events: self.events.clone(),
        });
        // the session goes in the map before the registry is stamped so the
        // local watcher never mistakes this call for an incoming one
        self.sessions.insert(session_id.clone(), session.clone());
        let call = ActiveCall {
            call_type,
            call_session_id: session_id.clone(),
            call_started_at: Utc::now(),
            answered: false,
        };
        if let Err(e) = self.collab.registry.mark_call_started(appointment_id, call).await {
            self.sessions.remove(&session_id);
            return Err(e.into());
        }
        session.start().await;
        info!("Placed {call_type} call {session_id} on appointment {appointment_id}");
        Ok(session)
    }

    /// Open a ringing session for a discovered invite.
    ///
    /// Idempotent per session id; opening an invite that already has a
    /// session returns the existing one. Incoming calls always ring until
    /// answered or declined, whatever the outgoing ringing policy says.
    pub async fn open_invite(&self, invite: &CallInvite) -> CallResult<Arc<CallSession>> {
        self.ensure_running()?;
        if let Some(existing) = self.sessions.get(&invite.session_id) {
            return Ok(existing.clone());
        }
        let session = CallSession::new(SessionParams {
            session_id: invite.session_id.clone(),
            appointment_id: invite.appointment_id.clone(),
            role: CallRole::Callee,
            call_type: invite.call_type,
            ringing_policy: RingingPolicy::Manual,
            config: self.config.clone(),
            collab: self.collab.clone(),
            events: self.events.clone(),
        });
        self.sessions.insert(invite.session_id.clone(), session.clone());
        session.start().await;
        Ok(session)
    }

    /// Look up a session by id.
    pub fn session(&self, session_id: &SessionId) -> Option<Arc<CallSession>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Every session currently tracked.
    pub fn sessions(&self) -> Vec<Arc<CallSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Accept a tracked session by id.
    pub async fn accept_call(&self, session_id: &SessionId) -> CallResult<()> {
        self.require_session(session_id)?.accept().await
    }

    /// Decline a tracked session by id, dropping it from the session map
    /// once terminal.
    pub async fn decline_call(&self, session_id: &SessionId) -> CallResult<()> {
        let session = self.require_session(session_id)?;
        session.decline().await?;
        if session.phase().await.is_terminal() {
            self.sessions.remove(session_id);
        }
        Ok(())
    }

    /// Hang up a tracked session by id, dropping it from the session map
    /// once terminal.
    pub async fn hangup_call(&self, session_id: &SessionId) -> CallResult<()> {
        let session = self.require_session(session_id)?;
        session.hangup().await?;
        if session.phase().await.is_terminal() {
            self.sessions.remove(session_id);
        }
        Ok(())
    }

    /// Toggle the microphone on a tracked session.
    pub async fn toggle_mute(&self, session_id: &SessionId) -> CallResult<bool> {
        self.require_session(session_id)?.toggle_mute().await
    }

    /// Toggle the camera on a tracked session.
    pub async fn toggle_camera(&self, session_id: &SessionId) -> CallResult<bool> {
        self.require_session(session_id)?.toggle_camera().await
    }

    fn require_session(&self, session_id: &SessionId) -> CallResult<Arc<CallSession>> {
        self.session(session_id)
            .ok_or_else(|| CallError::session_not_found(session_id.as_str()))
    }

    fn ensure_running(&self) -> CallResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CallError::invalid_state("call manager is not running"))
        }
    }

    async fn watch_for_invites(self: Arc<Self>) {
        let mut ticker = interval(self.config.watcher_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }
            match self.collab.registry.find_incoming_call().await {
                Ok(Some(invite)) => self.handle_invite(invite).await,
                Ok(None) => {}
                Err(e) => warn!("Incoming call poll failed: {e}"),
            }
        }
    }

    /// Surface a discovered invite exactly once and dispatch the handler.
    async fn handle_invite(self: &Arc<Self>, invite: CallInvite) {
        if self.sessions.contains_key(&invite.session_id) {
            // our own outgoing call, or an invite already ringing locally
            return;
        }
        if self.seen_invites.insert(invite.session_id.clone(), ()).is_some() {
            return;
        }
        info!(
            "Incoming {} call {} from {} on appointment {}",
            invite.call_type, invite.session_id, invite.from.name, invite.appointment_id
        );
        let session = match self.open_invite(&invite).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to open invite {}: {e}", invite.session_id);
                return;
            }
        };
        self.events.emit(CallEvent::IncomingCall { invite: invite.clone() });

        let Some(handler) = self.handler.clone() else {
            return;
        };
        match handler.on_incoming_call(&invite).await {
            CallAction::Accept => {
                if let Err(e) = session.accept().await {
                    warn!("Session {}: accept from handler failed: {e}", session.id());
                }
            }
            CallAction::Decline => {
                if let Err(e) = session.decline().await {
                    warn!("Session {}: decline from handler failed: {e}", session.id());
                } else {
                    self.sessions.remove(session.id());
                }
            }
            CallAction::Ignore => {
                debug!("Invite {} left ringing", invite.session_id);
            }
        }
    }
}
