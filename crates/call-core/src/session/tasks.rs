//! Background tasks owned by a call session.
//!
//! Two tasks run while a call is active. The signaling loop pumps transport
//! events and drains queued signaling messages on a fixed cadence; the
//! monitor loop samples outbound quality. Both stop on their own when the
//! session reaches a terminal phase and are aborted by teardown regardless.

use std::sync::Arc;

use televisit_media_core::{MediaTrack, PeerTransport, RemoteMedia, TransportEvent};
use televisit_signaling_core::{IceCandidate, SessionDescription, SignalingMessage};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::CallResult;
use crate::events::CallEvent;
use crate::monitor::QualitySample;
use crate::session::CallSession;
use crate::types::CallPhase;

impl CallSession {
    pub(crate) async fn spawn_tasks(
        self: &Arc<Self>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let session = self.clone();
        let handle = tokio::spawn(async move { session.signaling_loop(events).await });
        *self.signaling_task.lock().await = Some(handle);

        let session = self.clone();
        let handle = tokio::spawn(async move { session.monitor_loop().await });
        *self.monitor_task.lock().await = Some(handle);
    }

    async fn signaling_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let mut ticker = interval(self.config.signaling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.phase().await.is_terminal() {
                break;
            }
            self.pump_transport_events(&mut events).await;
            self.drain_signaling().await;
        }
        debug!("Session {}: signaling loop stopped", self.session_id);
    }

    async fn pump_transport_events(&self, events: &mut mpsc::UnboundedReceiver<TransportEvent>) {
        while let Ok(event) = events.try_recv() {
            match event {
                TransportEvent::RemoteTrack { track } => self.attach_remote_track(track).await,
                TransportEvent::LocalCandidate { candidate } => {
                    self.publish_candidate(candidate).await;
                }
            }
        }
    }

    async fn attach_remote_track(&self, track: MediaTrack) {
        let kind = track.kind();
        {
            let mut inner = self.inner.write().await;
            if inner.torn_down {
                track.stop();
                return;
            }
            inner.remote_media.get_or_insert_with(RemoteMedia::default).attach(track);
        }
        debug!("Session {}: remote {kind} track attached", self.session_id);
        self.events
            .emit(CallEvent::RemoteTrackAdded { session_id: self.session_id.clone(), kind });
    }

    async fn publish_candidate(&self, candidate: IceCandidate) {
        let message = SignalingMessage::candidate(candidate);
        if let Err(e) = self.collab.signaling.send(&self.session_id, message).await {
            warn!("Session {}: failed to publish local candidate: {e}", self.session_id);
        }
    }

    async fn drain_signaling(&self) {
        let transport = { self.inner.read().await.transport.clone() };
        let Some(transport) = transport else { return };
        let messages = match self.collab.signaling.receive(&self.session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Session {}: signaling receive failed: {e}", self.session_id);
                return;
            }
        };
        for message in messages {
            self.apply_signaling(&transport, message).await;
        }
    }

    /// Apply one queued signaling message.
    ///
    /// Failures never kill the loop. A bad candidate is dropped and later
    /// ones still apply; a failed offer or answer is logged and the next
    /// drain gets another chance.
    async fn apply_signaling(&self, transport: &Arc<dyn PeerTransport>, message: SignalingMessage) {
        match message {
            SignalingMessage::Offer { offer } => {
                if let Err(e) = self.answer_offer(transport, offer).await {
                    warn!("Session {}: failed to answer offer: {e}", self.session_id);
                }
            }
            SignalingMessage::Answer { answer } => {
                // the far side may queue the answer more than once; only the
                // first one may touch the transport
                if transport.has_remote_description().await {
                    debug!("Session {}: duplicate answer ignored", self.session_id);
                    return;
                }
                if let Err(e) = transport.set_remote_description(answer).await {
                    warn!("Session {}: failed to apply answer: {e}", self.session_id);
                }
            }
            SignalingMessage::Candidate { candidate } => {
                if let Err(e) = transport.add_candidate(candidate).await {
                    warn!("Session {}: candidate dropped: {e}", self.session_id);
                }
            }
        }
    }

    async fn answer_offer(
        &self,
        transport: &Arc<dyn PeerTransport>,
        offer: SessionDescription,
    ) -> CallResult<()> {
        transport.set_remote_description(offer).await?;
        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        self.collab.signaling.send(&self.session_id, SignalingMessage::answer(answer)).await?;
        Ok(())
    }

    async fn monitor_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.monitor.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.phase().await != CallPhase::Active {
                break;
            }
            self.quality_tick().await;
        }
        debug!("Session {}: quality monitor stopped", self.session_id);
    }

    async fn quality_tick(&self) {
        let transport = { self.inner.read().await.transport.clone() };
        let Some(transport) = transport else { return };
        let stats = match transport.outbound_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                // skip the tick; the streak is judged on real readings only
                debug!("Session {}: stats unavailable this tick: {e}", self.session_id);
                return;
            }
        };
        let now = Instant::now();
        let fired = {
            let mut inner = self.inner.write().await;
            if inner.torn_down || inner.phase != CallPhase::Active {
                return;
            }
            let sample = inner.window.observe(now, stats);
            let poor = sample.is_poor(&self.config.monitor);
            let video_sending = !inner.audio_only && inner.camera_on;
            let remote_present = inner.remote_media.is_some();
            let fire = inner.tracker.observe(
                now,
                poor,
                remote_present,
                video_sending,
                &self.config.monitor,
            );
            inner.latest_sample = Some(sample);
            self.events
                .emit(CallEvent::QualityReport { session_id: self.session_id.clone(), sample });
            fire.then_some(sample)
        };
        if let Some(sample) = fired {
            self.downgrade(sample).await;
        }
    }

    /// Drop the call to audio-only after sustained poor quality.
    async fn downgrade(&self, sample: QualitySample) {
        {
            let mut inner = self.inner.write().await;
            if inner.torn_down {
                return;
            }
            if let Some(track) = inner.local_media.as_ref().and_then(|m| m.live_video_track()) {
                track.stop();
            }
            inner.audio_only = true;
            inner.camera_on = false;
        }
        info!(
            "Session {}: sustained poor quality ({} kbps, {}% loss), downgrading to audio-only",
            self.session_id, sample.bitrate_kbps, sample.packet_loss_percent
        );
        self.events.emit(CallEvent::Downgraded { session_id: self.session_id.clone(), sample });
    }
}
