//! Two endpoints on one appointment, end to end.
//!
//! A doctor-side manager places a video call, the patient side discovers and
//! answers it, then the link is scripted to degrade until the doctor's
//! session drops itself to audio-only. The camera is recovered once the
//! (scripted) link clears up, and the call is hung up.
//!
//! Run it with logging to watch the machinery:
//!
//! ```bash
//! RUST_LOG=info cargo run -p televisit-call-core --example adaptive_call_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use televisit_call_core::{
    AppointmentRecord, AppointmentRegistry, AppointmentStatus, CallAction, CallConfig, CallEvent,
    CallInvite, CallManager, CallType, InMemoryAppointmentRegistry, IncomingCallHandler,
    MonitorConfig, Participant, RingingPolicy, TransportStats, format_call_timer,
};
use televisit_media_core::{SimulatedMediaDevices, SimulatedTransportFactory};
use televisit_signaling_core::InMemorySignalingChannel;
use tokio::sync::broadcast;

/// The patient answers everything.
struct AnswerEverything;

#[async_trait]
impl IncomingCallHandler for AnswerEverything {
    async fn on_incoming_call(&self, invite: &CallInvite) -> CallAction {
        println!(">> patient: answering {} call from {}", invite.call_type, invite.from.name);
        CallAction::Accept
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let registry = InMemoryAppointmentRegistry::new();
    registry.upsert(AppointmentRecord {
        id: "apt-100".to_string(),
        doctor: Participant::with_title("Sarah Chen", "MD"),
        patient: Participant::new("Jordan Alvarez"),
        status: AppointmentStatus::Scheduled,
        call: None,
    });

    let (doctor_signaling, patient_signaling) = InMemorySignalingChannel::pair();

    // a demo-paced monitor: short grace, short streak, one second cadence
    let monitor = MonitorConfig {
        sample_interval: Duration::from_millis(1000),
        grace_period: Duration::from_millis(4000),
        poor_streak_to_downgrade: 3,
        ..MonitorConfig::default()
    };
    let doctor_config = CallConfig::default()
        .with_monitor(monitor)
        .with_ringing_policy(RingingPolicy::AutoAdvance { after: Duration::from_millis(1500) });

    let doctor_devices = SimulatedMediaDevices::new();
    let doctor_transports = SimulatedTransportFactory::new();
    let doctor = CallManager::new(
        doctor_config,
        doctor_signaling,
        doctor_devices,
        doctor_transports.clone(),
        registry.clone(),
        None,
    )?;

    let patient = CallManager::new(
        CallConfig::default(),
        patient_signaling,
        SimulatedMediaDevices::new(),
        SimulatedTransportFactory::new(),
        registry.clone(),
        Some(Arc::new(AnswerEverything)),
    )?;

    doctor.start().await;
    patient.start().await;

    // narrate the doctor side in the background
    let mut narration = doctor.events();
    tokio::spawn(async move {
        while let Some(Ok(event)) = narration.next().await {
            match event {
                CallEvent::PhaseChanged { previous, phase, .. } => {
                    println!(">> doctor: call went {previous} -> {phase}");
                }
                CallEvent::LocalMediaReady { audio_only, .. } => {
                    println!(">> doctor: media up (audio_only: {audio_only})");
                }
                CallEvent::RemoteTrackAdded { kind, .. } => {
                    println!(">> doctor: remote {kind} track arrived");
                }
                CallEvent::QualityReport { sample, .. } => {
                    println!(
                        "   quality: {} kbps, {:.1}% loss",
                        sample.bitrate_kbps, sample.packet_loss_percent
                    );
                }
                CallEvent::Downgraded { sample, .. } => {
                    println!(
                        ">> doctor: DOWNGRADED to audio-only at {} kbps",
                        sample.bitrate_kbps
                    );
                }
                CallEvent::CameraRecovered { .. } => {
                    println!(">> doctor: camera recovered");
                }
                _ => {}
            }
        }
    });
    let mut waiter = doctor.subscribe();

    println!("== placing a video call on apt-100");
    let session = doctor.place_call("apt-100", CallType::Video).await?;

    // auto-advance answers the ring; wait for the session to come up
    wait_for(&mut waiter, |e| {
        matches!(e, CallEvent::LocalMediaReady { .. })
    })
    .await?;
    wait_for(&mut waiter, |e| matches!(e, CallEvent::RemoteTrackAdded { .. })).await?;
    println!("== connected, letting it run for a moment");
    tokio::time::sleep(Duration::from_millis(3000)).await;

    println!("== scripting a degraded link (~80 kbps)");
    let transport = doctor_transports
        .transport_for(session.id())
        .context("doctor transport exists")?;
    transport.set_auto_stats(false);
    let mut bytes = 0u64;
    let mut packets = 0u64;
    for _ in 0..120 {
        bytes += 10_000;
        packets += 100;
        transport.push_stats(TransportStats::new(bytes, packets, 0, 30.0));
    }

    wait_for(&mut waiter, |e| matches!(e, CallEvent::Downgraded { .. })).await?;
    println!(
        "== audio-only now (camera on: {}, timer {})",
        session.is_camera_on().await,
        format_call_timer(session.elapsed_seconds().await)
    );

    tokio::time::sleep(Duration::from_millis(2000)).await;
    println!("== bringing the camera back");
    let recovered = session.toggle_camera().await?;
    println!("== camera recovery {}", if recovered { "succeeded" } else { "failed" });

    tokio::time::sleep(Duration::from_millis(2000)).await;
    println!("== hanging up at {}", format_call_timer(session.elapsed_seconds().await));
    session.hangup().await?;

    let record = registry.get("apt-100").await?.context("appointment exists")?;
    println!(
        "== appointment back to {:?}, call cleared: {}",
        record.status,
        record.call.is_none()
    );

    doctor.stop().await;
    patient.stop().await;
    Ok(())
}

async fn wait_for(
    rx: &mut broadcast::Receiver<CallEvent>,
    pred: impl Fn(&CallEvent) -> bool,
) -> Result<CallEvent> {
    tokio::time::timeout(Duration::from_secs(90), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => anyhow::bail!("event channel closed: {e}"),
            }
        }
    })
    .await
    .context("timed out waiting for an event")?
}
