//! Appointment registry.
//!
//! Calls in televisit hang off appointments: placing a call stamps call
//! metadata onto the appointment record, answering it flips the answered
//! flag, and tearing the call down clears the metadata again. The patient
//! side discovers incoming calls by watching for appointments that carry an
//! unanswered call.
//!
//! # Architecture
//!
//! ```text
//!  caller                      registry                     callee
//!    |                            |                           |
//!    |-- mark_call_started ------>|                           |
//!    |                            |<----- find_incoming_call -|
//!    |                            |------ CallInvite -------->|
//!    |                            |<----- mark_call_answered -|
//!    |                            |                           |
//!    |-- clear_call ------------->|   (either side, on hangup |
//!    |                            |    or decline)            |
//! ```
//!
//! Records are only ever patched through these operations. Nothing here
//! blindly overwrites a whole record, so concurrent bookkeeping from the
//! two sides cannot clobber each other's fields.
//!
//! # Usage
//!
//! ```rust
//! use televisit_call_core::registry::{
//!     AppointmentRecord, AppointmentRegistry, AppointmentStatus, InMemoryAppointmentRegistry,
//!     RegistryError,
//! };
//! use televisit_call_core::types::Participant;
//!
//! # async fn example() -> Result<(), RegistryError> {
//! let registry = InMemoryAppointmentRegistry::new();
//! registry.upsert(AppointmentRecord {
//!     id: "apt-100".to_string(),
//!     doctor: Participant::with_title("Sarah Chen", "MD"),
//!     patient: Participant::new("Jordan Alvarez"),
//!     status: AppointmentStatus::Scheduled,
//!     call: None,
//! });
//!
//! assert!(registry.find_incoming_call().await?.is_none());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use televisit_signaling_core::SessionId;
use thiserror::Error;

use crate::types::{CallInvite, CallType, Participant};

/// Identifier of an appointment
pub type AppointmentId = String;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error from the appointment registry backend.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RegistryError {
    /// What went wrong
    pub message: String,
}

impl RegistryError {
    /// Create a registry error
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Where an appointment is in its own workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, visit not started
    Scheduled,
    /// A call is underway or being set up
    InProgress,
    /// Visit finished
    Completed,
    /// Visit cancelled
    Cancelled,
}

/// Call metadata stamped onto an appointment while a call exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCall {
    /// Whether the caller wants video
    pub call_type: CallType,
    /// Session id assigned by the calling side
    pub call_session_id: SessionId,
    /// When the caller started the call
    pub call_started_at: DateTime<Utc>,
    /// Set once the far side accepts; records without the field are
    /// treated as unanswered
    #[serde(rename = "callAnswered", default)]
    pub answered: bool,
}

/// One appointment as the registry stores it.
///
/// Call metadata is flattened into the record, matching the wire shape of
/// the scheduling backend where `callType`, `callSessionId` and friends sit
/// directly on the appointment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    /// Appointment identifier
    pub id: AppointmentId,
    /// The clinician side of the visit
    pub doctor: Participant,
    /// The patient side of the visit
    pub patient: Participant,
    /// Workflow status
    pub status: AppointmentStatus,
    /// Call metadata, present only while a call exists
    #[serde(flatten)]
    pub call: Option<ActiveCall>,
}

/// Shared appointment store both call sides do their bookkeeping against.
#[async_trait]
pub trait AppointmentRegistry: Send + Sync {
    /// Fetch an appointment by id.
    async fn get(&self, appointment_id: &str) -> RegistryResult<Option<AppointmentRecord>>;

    /// Stamp call metadata onto an appointment and move it to
    /// [`AppointmentStatus::InProgress`]. Fails if the appointment does
    /// not exist.
    async fn mark_call_started(&self, appointment_id: &str, call: ActiveCall)
    -> RegistryResult<()>;

    /// Record that the call on an appointment was answered.
    ///
    /// A no-op when the appointment no longer carries a call or carries a
    /// different session's call; the answer raced a teardown and lost.
    async fn mark_call_answered(
        &self,
        appointment_id: &str,
        session_id: &SessionId,
    ) -> RegistryResult<()>;

    /// Remove call metadata from whichever appointment carries the given
    /// session's call. Idempotent; clearing an unknown session does
    /// nothing.
    async fn clear_call(&self, session_id: &SessionId) -> RegistryResult<()>;

    /// Find an appointment carrying an unanswered call, if any.
    ///
    /// Returns the invite for the first one found. Appointments whose call
    /// was already answered do not ring again.
    async fn find_incoming_call(&self) -> RegistryResult<Option<CallInvite>>;
}

/// Registry kept in process memory.
///
/// Serves tests, demos, and single-process deployments; a scheduling
/// backend client implements [`AppointmentRegistry`] the same way.
#[derive(Debug, Default)]
pub struct InMemoryAppointmentRegistry {
    records: DashMap<AppointmentId, AppointmentRecord>,
}

impl InMemoryAppointmentRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace an appointment record.
    ///
    /// Seeding only; call bookkeeping goes through the trait methods.
    pub fn upsert(&self, record: AppointmentRecord) {
        self.records.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl AppointmentRegistry for InMemoryAppointmentRegistry {
    async fn get(&self, appointment_id: &str) -> RegistryResult<Option<AppointmentRecord>> {
        Ok(self.records.get(appointment_id).map(|r| r.clone()))
    }

    async fn mark_call_started(
        &self,
        appointment_id: &str,
        call: ActiveCall,
    ) -> RegistryResult<()> {
        let mut record = self
            .records
            .get_mut(appointment_id)
            .ok_or_else(|| RegistryError::new(format!("unknown appointment {appointment_id}")))?;
        record.status = AppointmentStatus::InProgress;
        record.call = Some(call);
        Ok(())
    }

    async fn mark_call_answered(
        &self,
        appointment_id: &str,
        session_id: &SessionId,
    ) -> RegistryResult<()> {
        if let Some(mut record) = self.records.get_mut(appointment_id) {
            if let Some(call) = record.call.as_mut() {
                if &call.call_session_id == session_id {
                    call.answered = true;
                }
            }
        }
        Ok(())
    }

    async fn clear_call(&self, session_id: &SessionId) -> RegistryResult<()> {
        for mut record in self.records.iter_mut() {
            let matches = record
                .call
                .as_ref()
                .is_some_and(|call| &call.call_session_id == session_id);
            if matches {
                record.call = None;
                // the appointment goes back on the board so it can be called again
                if record.status == AppointmentStatus::InProgress {
                    record.status = AppointmentStatus::Scheduled;
                }
                break;
            }
        }
        Ok(())
    }

    async fn find_incoming_call(&self) -> RegistryResult<Option<CallInvite>> {
        for record in self.records.iter() {
            if record.status != AppointmentStatus::InProgress {
                continue;
            }
            if let Some(call) = record.call.as_ref() {
                if !call.answered {
                    return Ok(Some(CallInvite {
                        appointment_id: record.id.clone(),
                        session_id: call.call_session_id.clone(),
                        call_type: call.call_type,
                        from: record.doctor.clone(),
                        started_at: call.call_started_at,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(id: &str) -> AppointmentRecord {
        AppointmentRecord {
            id: id.to_string(),
            doctor: Participant::with_title("Sarah Chen", "MD"),
            patient: Participant::new("Jordan Alvarez"),
            status: AppointmentStatus::Scheduled,
            call: None,
        }
    }

    fn call(session_id: &str) -> ActiveCall {
        ActiveCall {
            call_type: CallType::Video,
            call_session_id: SessionId::new(session_id),
            call_started_at: Utc::now(),
            answered: false,
        }
    }

    #[tokio::test]
    async fn starting_a_call_stamps_the_appointment() {
        let registry = InMemoryAppointmentRegistry::new();
        registry.upsert(appointment("apt-1"));

        registry.mark_call_started("apt-1", call("call-1")).await.unwrap();

        let record = registry.get("apt-1").await.unwrap().unwrap();
        assert_eq!(record.status, AppointmentStatus::InProgress);
        assert!(!record.call.unwrap().answered);
    }

    #[tokio::test]
    async fn starting_a_call_on_an_unknown_appointment_fails() {
        let registry = InMemoryAppointmentRegistry::new();
        assert!(registry.mark_call_started("apt-missing", call("call-1")).await.is_err());
    }

    #[tokio::test]
    async fn answering_flips_the_flag_only_for_the_matching_session() {
        let registry = InMemoryAppointmentRegistry::new();
        registry.upsert(appointment("apt-1"));
        registry.mark_call_started("apt-1", call("call-1")).await.unwrap();

        registry.mark_call_answered("apt-1", &SessionId::new("call-stale")).await.unwrap();
        let record = registry.get("apt-1").await.unwrap().unwrap();
        assert!(!record.call.unwrap().answered, "stale session must not answer");

        registry.mark_call_answered("apt-1", &SessionId::new("call-1")).await.unwrap();
        let record = registry.get("apt-1").await.unwrap().unwrap();
        assert!(record.call.unwrap().answered);
    }

    #[tokio::test]
    async fn clearing_removes_the_call_and_reopens_the_appointment() {
        let registry = InMemoryAppointmentRegistry::new();
        registry.upsert(appointment("apt-1"));
        registry.mark_call_started("apt-1", call("call-1")).await.unwrap();

        registry.clear_call(&SessionId::new("call-1")).await.unwrap();
        let record = registry.get("apt-1").await.unwrap().unwrap();
        assert!(record.call.is_none());
        assert_eq!(record.status, AppointmentStatus::Scheduled);

        // clearing again, or clearing a session nobody has, is harmless
        registry.clear_call(&SessionId::new("call-1")).await.unwrap();
        registry.clear_call(&SessionId::new("call-elsewhere")).await.unwrap();
    }

    #[tokio::test]
    async fn only_unanswered_calls_surface_as_invites() {
        let registry = InMemoryAppointmentRegistry::new();
        registry.upsert(appointment("apt-1"));
        assert!(registry.find_incoming_call().await.unwrap().is_none());

        registry.mark_call_started("apt-1", call("call-1")).await.unwrap();
        let invite = registry.find_incoming_call().await.unwrap().unwrap();
        assert_eq!(invite.appointment_id, "apt-1");
        assert_eq!(invite.from.name, "Sarah Chen");

        registry.mark_call_answered("apt-1", &SessionId::new("call-1")).await.unwrap();
        assert!(registry.find_incoming_call().await.unwrap().is_none());
    }

    #[test]
    fn call_metadata_flattens_onto_the_record() {
        let mut record = appointment("apt-1");
        record.status = AppointmentStatus::InProgress;
        record.call = Some(ActiveCall {
            call_type: CallType::Video,
            call_session_id: SessionId::new("call-1"),
            call_started_at: "2026-03-02T10:00:00Z".parse().unwrap(),
            answered: true,
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["callType"], "video");
        assert_eq!(json["callSessionId"], "call-1");
        assert_eq!(json["callAnswered"], true);
        assert!(json.get("call").is_none(), "call block must flatten, not nest");

        let parsed: AppointmentRecord = serde_json::from_value(json).unwrap();
        assert!(parsed.call.unwrap().answered);
    }

    #[test]
    fn records_without_call_fields_parse_as_no_call() {
        let json = serde_json::json!({
            "id": "apt-2",
            "doctor": { "name": "Sarah Chen" },
            "patient": { "name": "Jordan Alvarez" },
            "status": "scheduled"
        });
        let parsed: AppointmentRecord = serde_json::from_value(json).unwrap();
        assert!(parsed.call.is_none());
    }
}
