// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use availability_cell::models::SlotKey;
use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, BookingCommit, BookingDraft,
    ParticipantFilter, PurgeSummary,
};

/// Persistence for appointments and the joint slot transitions.
///
/// `commit_booking` and `commit_cancellation` touch both the slot and the
/// appointment and must be all-or-nothing: no reader may ever observe a
/// booked slot without its appointment or the reverse.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Re-reads the slot identified by `key`; if it exists, is unbooked and
    /// starts after `now`, marks it booked and creates a confirmed
    /// appointment for `draft.patient_id`. Anything else is
    /// `SlotUnavailable` and leaves the slot untouched.
    async fn commit_booking(
        &self,
        key: &SlotKey,
        draft: BookingDraft,
        now: DateTime<Utc>,
    ) -> Result<BookingCommit, AppointmentError>;

    /// Sets a confirmed appointment to cancelled and frees its slot.
    async fn commit_cancellation(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    /// `confirmed -> completed`; the slot stays booked.
    async fn commit_completion(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Appointments of one participant filtered by `query`, ordered by slot
    /// date then start time in `query.order`.
    async fn list_appointments(
        &self,
        participant: ParticipantFilter,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn update_notes(&self, appointment_id: Uuid, notes: String) -> Result<Appointment, AppointmentError>;

    /// Stores the external calendar event id for one side of the appointment.
    async fn record_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
        event_id: String,
    ) -> Result<(), AppointmentError>;

    /// Removes everything a departing user owns. Refused with
    /// `ParticipantBusy` while the user has a confirmed appointment;
    /// otherwise deletes the user's terminal appointments, the slots their
    /// completed appointments consumed and, for a doctor, all of their
    /// slots. Slots other appointments still reference are kept.
    async fn purge_participant(&self, user_id: Uuid) -> Result<PurgeSummary, AppointmentError>;
}
