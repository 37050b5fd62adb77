// libs/appointment-cell/src/services/booking.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use availability_cell::models::DoctorProfile;
use availability_cell::services::{DoctorDirectory, SlotStore};
use notification_cell::{
    BookingEvent, BookingNotice, NotificationDispatcher, NotificationJob, Participant,
};
use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_utils::extractor::Caller;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookAppointmentRequest,
    BookingDraft, BookingStats, CallerContact, DoctorDashboard, ParticipantFilter, PurgeSummary,
    SortOrder, UpdateAppointmentRequest, MAX_NOTES_LENGTH,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockTable;
use crate::services::store::AppointmentStore;

const DASHBOARD_UPCOMING_LIMIT: usize = 10;

#[derive(Default)]
struct BookingMetrics {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    unavailable: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

impl BookingMetrics {
    fn record_failure(&self, error: &AppointmentError) {
        match error {
            AppointmentError::SlotUnavailable => {
                self.unavailable.fetch_add(1, Ordering::Relaxed);
            }
            AppointmentError::BookingTimeout(_) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> BookingStats {
        BookingStats {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Turns published slots into appointments and drives their lifecycle.
///
/// Competing bookings for one slot are serialized by a per-slot lock; the
/// store commit inside the lock re-checks the slot, so exactly one caller
/// wins and every other caller gets `SlotUnavailable`. Notifications are
/// queued only after the lock is released and never affect the result.
pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    slots: Arc<dyn SlotStore>,
    directory: Arc<dyn DoctorDirectory>,
    locks: SlotLockTable,
    lifecycle: AppointmentLifecycleService,
    notifications: Option<NotificationDispatcher>,
    metrics: BookingMetrics,
}

impl AppointmentBookingService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        slots: Arc<dyn SlotStore>,
        directory: Arc<dyn DoctorDirectory>,
        config: &AppConfig,
    ) -> Self {
        Self {
            appointments,
            slots,
            directory,
            locks: SlotLockTable::new(Duration::from_millis(config.slot_lock_timeout_ms)),
            lifecycle: AppointmentLifecycleService::new(),
            notifications: None,
            metrics: BookingMetrics::default(),
        }
    }

    pub fn with_notifications(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifications = Some(dispatcher);
        self
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Book the slot `(doctor, date, start, end)` for `patient_id`.
    #[instrument(skip(self, contact, request), fields(doctor_id = %request.doctor_id, date = %request.date))]
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        contact: &CallerContact,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.metrics.attempted.fetch_add(1, Ordering::Relaxed);

        let result = self.try_book(patient_id, request).await;
        match &result {
            Ok((appointment, doctor)) => {
                self.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                info!("Booked appointment {} for patient {}", appointment.id, patient_id);
                self.notify(BookingEvent::BookingCreated, appointment, Some(doctor), patient_id, contact);
            }
            Err(e) => {
                self.metrics.record_failure(e);
                debug!("Booking failed: {}", e);
            }
        }

        result.map(|(appointment, _)| appointment)
    }

    async fn try_book(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
    ) -> Result<(Appointment, DoctorProfile), AppointmentError> {
        Self::validate_booking_request(&request)?;

        let doctor = self
            .directory
            .find_doctor(request.doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;

        let key = request.slot_key();
        let draft = BookingDraft {
            patient_id,
            notes: request.notes.unwrap_or_default(),
        };

        let commit = {
            let _guard = self.locks.acquire(key).await?;
            self.appointments.commit_booking(&key, draft, Utc::now()).await?
        };

        debug!("Slot {} booked as appointment {}", commit.slot.id, commit.appointment.id);
        Ok((commit.appointment, doctor))
    }

    fn validate_booking_request(request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
        if request.end_time <= request.start_time {
            return Err(AppointmentError::ValidationError(
                "End time must be after start time".to_string(),
            ));
        }

        if let Some(notes) = &request.notes {
            Self::validate_notes(notes)?;
        }

        Ok(())
    }

    fn validate_notes(notes: &str) -> Result<(), AppointmentError> {
        if notes.chars().count() > MAX_NOTES_LENGTH {
            return Err(AppointmentError::ValidationError(format!(
                "Notes cannot exceed {} characters",
                MAX_NOTES_LENGTH
            )));
        }
        Ok(())
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    /// Cancel on behalf of either participant.
    pub async fn cancel_appointment(
        &self,
        caller: Caller,
        contact: &CallerContact,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(caller, appointment_id).await?;
        self.cancel(appointment, caller, contact).await
    }

    /// Doctor-side cancellation of one of their own bookings. Appointments
    /// of other doctors are reported as missing.
    pub async fn cancel_doctor_booking(
        &self,
        doctor: Caller,
        contact: &CallerContact,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .appointments
            .get_appointment(appointment_id)
            .await?
            .filter(|a| a.doctor_id == doctor.id)
            .ok_or(AppointmentError::NotFound)?;

        self.cancel(appointment, doctor, contact).await
    }

    #[instrument(skip(self, appointment, contact), fields(appointment_id = %appointment.id))]
    async fn cancel(
        &self,
        appointment: Appointment,
        caller: Caller,
        contact: &CallerContact,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let cancelled = {
            let _guard = self.locks.acquire(appointment.slot_key()).await?;
            self.appointments.commit_cancellation(appointment.id).await?
        };

        self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        info!("Appointment {} cancelled by {} {}", cancelled.id, caller.role, caller.id);

        let doctor = self.directory.find_doctor(cancelled.doctor_id).await.unwrap_or_else(|e| {
            warn!("Doctor lookup for cancellation notice failed: {}", e);
            None
        });
        self.notify(BookingEvent::BookingCancelled, &cancelled, doctor.as_ref(), caller.id, contact);

        Ok(cancelled)
    }

    /// Doctor marks their own confirmed appointment as completed.
    pub async fn complete_appointment(
        &self,
        doctor: Caller,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        if !doctor.is_doctor() {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment = self.get_appointment(doctor, appointment_id).await?;
        if appointment.doctor_id != doctor.id {
            return Err(AppointmentError::Unauthorized);
        }

        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        let completed = self.appointments.commit_completion(appointment_id).await?;
        info!("Appointment {} completed", appointment_id);
        Ok(completed)
    }

    /// Notes edit and/or status change. `cancelled` routes through the
    /// joint cancellation and `completed` through completion.
    pub async fn update_appointment(
        &self,
        caller: Caller,
        contact: &CallerContact,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(caller, appointment_id).await?;

        if let Some(notes) = &request.notes {
            Self::validate_notes(notes)?;
        }

        if let Some(status) = request.status {
            appointment = match status {
                AppointmentStatus::Cancelled => self.cancel(appointment, caller, contact).await?,
                AppointmentStatus::Completed => self.complete_appointment(caller, appointment_id).await?,
                AppointmentStatus::Confirmed => {
                    self.lifecycle.validate_status_transition(appointment.status, status)?;
                    appointment
                }
            };
        }

        if let Some(notes) = request.notes {
            appointment = self.appointments.update_notes(appointment_id, notes).await?;
        }

        Ok(appointment)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    /// An appointment visible to `caller` (either participant).
    pub async fn get_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .appointments
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !appointment.involves(caller.id) {
            warn!("User {} denied access to appointment {}", caller.id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }

        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        caller: Caller,
        query: AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let participant = match caller.role {
            Role::Doctor => ParticipantFilter::Doctor(caller.id),
            Role::Patient => ParticipantFilter::Patient(caller.id),
        };

        self.appointments.list_appointments(participant, &query).await
    }

    /// The doctor's bookings, most recent slot first.
    pub async fn doctor_bookings(
        &self,
        doctor: Caller,
        query: AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentQuery {
            order: SortOrder::Desc,
            ..query
        };
        self.appointments
            .list_appointments(ParticipantFilter::Doctor(doctor.id), &query)
            .await
    }

    pub async fn doctor_dashboard(&self, doctor: Caller) -> Result<DoctorDashboard, AppointmentError> {
        let now = Utc::now();
        let today = now.date_naive();

        let confirmed = self
            .appointments
            .list_appointments(
                ParticipantFilter::Doctor(doctor.id),
                &AppointmentQuery {
                    status: Some(AppointmentStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await?;

        let today_confirmed = confirmed.iter().filter(|a| a.date == today).count();
        let upcoming: Vec<Appointment> = confirmed.into_iter().filter(|a| a.date >= today).collect();
        let total_upcoming = upcoming.len();

        let next_available_slot = self
            .slots
            .list_slots(doctor.id, None)
            .await?
            .into_iter()
            .find(|slot| slot.is_available(now));

        Ok(DoctorDashboard {
            today_confirmed,
            upcoming: upcoming.into_iter().take(DASHBOARD_UPCOMING_LIMIT).collect(),
            total_upcoming,
            next_available_slot,
        })
    }

    pub fn stats(&self) -> BookingStats {
        self.metrics.snapshot()
    }

    /// Removes a departing user's scheduling data; see
    /// `AppointmentStore::purge_participant` for the policy.
    pub async fn purge_participant(&self, user_id: Uuid) -> Result<PurgeSummary, AppointmentError> {
        self.appointments.purge_participant(user_id).await
    }

    // ==========================================================================
    // NOTIFICATIONS
    // ==========================================================================

    /// Queues one job per participant. Only the caller's own contact
    /// details are known here; the doctor's come from the directory.
    fn notify(
        &self,
        event: BookingEvent,
        appointment: &Appointment,
        doctor: Option<&DoctorProfile>,
        caller_id: Uuid,
        contact: &CallerContact,
    ) {
        let Some(dispatcher) = &self.notifications else {
            return;
        };

        let participant = |user_id: Uuid, role: Role, known: Option<(Option<String>, String)>| {
            let (email, display_name) = known.unwrap_or_else(|| (None, role.to_string()));
            Participant {
                user_id,
                role,
                email,
                display_name,
            }
        };

        let doctor_known = doctor
            .map(|d| (d.email.clone(), d.display_name.clone()))
            .or_else(|| {
                (caller_id == appointment.doctor_id)
                    .then(|| (contact.email.clone(), contact.display_name.clone()))
            });
        let patient_known = (caller_id == appointment.patient_id)
            .then(|| (contact.email.clone(), contact.display_name.clone()));

        let doctor = participant(appointment.doctor_id, Role::Doctor, doctor_known);
        let patient = participant(appointment.patient_id, Role::Patient, patient_known);

        let notice = BookingNotice {
            appointment_id: appointment.id,
            doctor_name: doctor.display_name.clone(),
            patient_name: patient.display_name.clone(),
            date: appointment.date,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            notes: Some(appointment.notes.clone()).filter(|n| !n.is_empty()),
            doctor_calendar_event_id: appointment.doctor_calendar_event_id.clone(),
            patient_calendar_event_id: appointment.patient_calendar_event_id.clone(),
        };

        for participant in [patient, doctor] {
            // Dispatch failures are already logged by the dispatcher.
            let _ = dispatcher.dispatch(NotificationJob::new(event, participant, notice.clone()));
        }
    }
}
