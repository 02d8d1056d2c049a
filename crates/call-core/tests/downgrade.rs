//! Adaptive downgrade behavior under sustained poor quality.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use televisit_call_core::{
    CallAction, CallConfig, CallEvent, CallInvite, CallType, IncomingCallHandler, TransportStats,
};
use televisit_media_core::SimulatedPeerTransport;

use common::{TestBed, drain_matching};

struct AutoAccept;

#[async_trait]
impl IncomingCallHandler for AutoAccept {
    async fn on_incoming_call(&self, _invite: &CallInvite) -> CallAction {
        CallAction::Accept
    }
}

struct NeverAnswer;

#[async_trait]
impl IncomingCallHandler for NeverAnswer {
    async fn on_incoming_call(&self, _invite: &CallInvite) -> CallAction {
        CallAction::Ignore
    }
}

/// Builds cumulative counter readings for the stats script.
///
/// Reads are 2 s apart, so a 10 kB step is 40 kbps (poor) and a 100 kB step
/// is 400 kbps (healthy).
struct StatsScript {
    bytes: u64,
    packets: u64,
    lost: u64,
    entries: Vec<TransportStats>,
}

impl StatsScript {
    fn new() -> Self {
        Self { bytes: 0, packets: 0, lost: 0, entries: Vec::new() }
    }

    fn good(mut self, reads: usize) -> Self {
        for _ in 0..reads {
            self.bytes += 100_000;
            self.packets += 100;
            self.entries.push(TransportStats::new(self.bytes, self.packets, self.lost, 30.0));
        }
        self
    }

    fn poor(mut self, reads: usize) -> Self {
        for _ in 0..reads {
            self.bytes += 10_000;
            self.packets += 100;
            self.entries.push(TransportStats::new(self.bytes, self.packets, self.lost, 30.0));
        }
        self
    }

    fn apply(self, transport: &SimulatedPeerTransport) {
        transport.set_auto_stats(false);
        for entry in self.entries {
            transport.push_stats(entry);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn sustained_poor_bitrate_downgrades_to_audio_only_once() {
    let bed = TestBed::start(CallConfig::default(), Some(Arc::new(AutoAccept))).await;
    bed.seed_appointment("apt-1");

    let session = bed.doctor.manager.place_call("apt-1", CallType::Video).await.unwrap();
    session.accept().await.unwrap();
    let mut events = bed.doctor.manager.subscribe();

    let transport = bed.doctor.transports.transport_for(session.id()).unwrap();
    StatsScript::new().poor(40).apply(&transport);

    // grace period plus four poor samples: nothing happens yet
    tokio::time::sleep(Duration::from_millis(29_000)).await;
    assert!(!session.is_audio_only().await);
    assert!(session.is_camera_on().await);

    // the fifth eligible poor sample lands at the 30 second mark
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(session.is_audio_only().await);
    assert!(!session.is_camera_on().await);

    let video = transport
        .sender_tracks()
        .into_iter()
        .find(|t| t.kind() == televisit_call_core::TrackKind::Video)
        .expect("video sender exists");
    assert!(!video.is_live(), "the outbound video track must be stopped");

    // the far side keeps its own video; the downgrade is local
    let patient_session = bed.patient.manager.session(session.id()).unwrap();
    assert!(!patient_session.is_audio_only().await);

    // quality keeps being poor, but the downgrade never fires again
    tokio::time::sleep(Duration::from_millis(20_000)).await;
    let downgrades = drain_matching(&mut events, |e| matches!(e, CallEvent::Downgraded { .. }));
    assert_eq!(downgrades, 1, "the downgrade is one-shot per call");

    let latest = session.latest_quality().await.expect("monitor produced samples");
    assert_eq!(latest.bitrate_kbps, 40);
}

#[tokio::test(start_paused = true)]
async fn one_good_sample_resets_the_poor_streak() {
    let bed = TestBed::start(CallConfig::default(), Some(Arc::new(AutoAccept))).await;
    bed.seed_appointment("apt-2");

    let session = bed.doctor.manager.place_call("apt-2", CallType::Video).await.unwrap();
    session.accept().await.unwrap();

    let transport = bed.doctor.transports.transport_for(session.id()).unwrap();
    // 11 reads cover the grace period (ticks at 0 through 20 s); then three
    // poor, one good that wipes the streak, then five poor to go the
    // distance
    StatsScript::new().good(11).poor(3).good(1).poor(10).apply(&transport);

    // the streak that started at 30 s has only reached four by 37 s
    tokio::time::sleep(Duration::from_millis(37_000)).await;
    assert!(!session.is_audio_only().await, "reset streak must start over");

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(session.is_audio_only().await, "five fresh poor samples fire at 38 s");
}

#[tokio::test(start_paused = true)]
async fn downgrade_waits_for_remote_media() {
    let bed = TestBed::start(CallConfig::default(), Some(Arc::new(NeverAnswer))).await;
    bed.seed_appointment("apt-3");

    let session = bed.doctor.manager.place_call("apt-3", CallType::Video).await.unwrap();
    session.accept().await.unwrap();
    let mut events = bed.doctor.manager.subscribe();

    let transport = bed.doctor.transports.transport_for(session.id()).unwrap();
    StatsScript::new().poor(40).apply(&transport);

    // a full minute of poor samples with nobody on the far end
    tokio::time::sleep(Duration::from_millis(60_000)).await;

    assert!(!session.has_remote_media().await);
    assert!(!session.is_audio_only().await, "no remote media, no downgrade");
    assert_eq!(drain_matching(&mut events, |e| matches!(e, CallEvent::Downgraded { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn camera_toggle_after_downgrade_reacquires_a_fresh_track() {
    let bed = TestBed::start(CallConfig::default(), Some(Arc::new(AutoAccept))).await;
    bed.seed_appointment("apt-4");

    let session = bed.doctor.manager.place_call("apt-4", CallType::Video).await.unwrap();
    session.accept().await.unwrap();
    let mut events = bed.doctor.manager.subscribe();

    let transport = bed.doctor.transports.transport_for(session.id()).unwrap();
    StatsScript::new().poor(40).apply(&transport);
    tokio::time::sleep(Duration::from_millis(31_000)).await;
    assert!(session.is_audio_only().await);

    // first attempt: the camera is still unavailable
    bed.doctor.devices.set_fail_video(true);
    assert!(!session.toggle_camera().await.unwrap());
    assert!(session.is_audio_only().await, "a failed recovery changes nothing");
    assert!(!session.is_camera_on().await);

    // second attempt: the camera is back
    bed.doctor.devices.set_fail_video(false);
    assert!(session.toggle_camera().await.unwrap());
    assert!(!session.is_audio_only().await);
    assert!(session.is_camera_on().await);
    assert_eq!(
        drain_matching(&mut events, |e| matches!(e, CallEvent::CameraRecovered { .. })),
        1
    );

    // a fresh live video sender joined the stopped one
    let video_tracks: Vec<_> = transport
        .sender_tracks()
        .into_iter()
        .filter(|t| t.kind() == televisit_call_core::TrackKind::Video)
        .collect();
    assert_eq!(video_tracks.len(), 2);
    assert_eq!(video_tracks.iter().filter(|t| t.is_live()).count(), 1);
}
