//! Shared scaffolding for call orchestration tests.
//!
//! A [`TestBed`] wires two call managers, a doctor side and a patient side,
//! to one shared appointment registry and a linked pair of in-memory
//! signaling channels, with scriptable devices and transports on each side.
//! Tests run under a paused tokio clock, so the ringing, signaling, and
//! monitoring cadences elapse instantly.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use televisit_call_core::{
    AppointmentRecord, AppointmentStatus, CallConfig, CallEvent, CallManager,
    InMemoryAppointmentRegistry, IncomingCallHandler, Participant,
};
use televisit_media_core::{SimulatedMediaDevices, SimulatedTransportFactory};
use televisit_signaling_core::InMemorySignalingChannel;
use tokio::sync::broadcast;

/// One endpoint: its manager plus the scriptable collaborators behind it.
pub struct Peer {
    pub manager: Arc<CallManager>,
    pub signaling: Arc<InMemorySignalingChannel>,
    pub devices: Arc<SimulatedMediaDevices>,
    pub transports: Arc<SimulatedTransportFactory>,
}

pub struct TestBed {
    pub registry: Arc<InMemoryAppointmentRegistry>,
    pub doctor: Peer,
    pub patient: Peer,
}

impl TestBed {
    /// Build and start both sides.
    ///
    /// The doctor side places calls with `doctor_config`; the patient side
    /// runs defaults plus the given incoming-call handler.
    pub async fn start(
        doctor_config: CallConfig,
        patient_handler: Option<Arc<dyn IncomingCallHandler>>,
    ) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();

        let registry = InMemoryAppointmentRegistry::new();
        let (doctor_signaling, patient_signaling) = InMemorySignalingChannel::pair();

        let doctor = Self::peer(doctor_config, doctor_signaling, registry.clone(), None);
        let patient =
            Self::peer(CallConfig::default(), patient_signaling, registry.clone(), patient_handler);

        doctor.manager.start().await;
        patient.manager.start().await;

        Self { registry, doctor, patient }
    }

    fn peer(
        config: CallConfig,
        signaling: Arc<InMemorySignalingChannel>,
        registry: Arc<InMemoryAppointmentRegistry>,
        handler: Option<Arc<dyn IncomingCallHandler>>,
    ) -> Peer {
        let devices = SimulatedMediaDevices::new();
        let transports = SimulatedTransportFactory::new();
        let manager = CallManager::new(
            config,
            signaling.clone(),
            devices.clone(),
            transports.clone(),
            registry,
            handler,
        )
        .expect("manager construction");
        Peer { manager, signaling, devices, transports }
    }

    pub fn seed_appointment(&self, id: &str) {
        self.registry.upsert(AppointmentRecord {
            id: id.to_string(),
            doctor: Participant::with_title("Sarah Chen", "MD"),
            patient: Participant::new("Jordan Alvarez"),
            status: AppointmentStatus::Scheduled,
            call: None,
        });
    }
}

/// Wait for the first event matching `pred`, panicking after a minute of
/// (virtual) silence.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<CallEvent>,
    mut pred: impl FnMut(&CallEvent) -> bool,
) -> CallEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    panic!("event subscriber lagged by {skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event channel closed while waiting");
                }
            }
        }
    })
    .await
    .expect("timed out waiting for a matching event")
}

/// Count buffered events matching `pred` without waiting for more.
pub fn drain_matching(
    rx: &mut broadcast::Receiver<CallEvent>,
    mut pred: impl FnMut(&CallEvent) -> bool,
) -> usize {
    let mut count = 0;
    while let Ok(event) = rx.try_recv() {
        if pred(&event) {
            count += 1;
        }
    }
    count
}
