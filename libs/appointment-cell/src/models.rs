// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use availability_cell::models::{AvailabilitySlot, SlotError, SlotKey};

pub const MAX_NOTES_LENGTH: usize = 2000;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked slot. The slot identity is copied onto the appointment and
/// cannot change while the slot is booked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: String,
    pub doctor_calendar_event_id: Option<String>,
    pub patient_calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.date, self.start_time, self.end_time)
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }

    /// Orders by slot date then start time.
    pub fn schedule_order(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Everything the store needs to create the appointment once the slot is won.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub patient_id: Uuid,
    pub notes: String,
}

/// Contact details of the authenticated caller, used for notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerContact {
    pub email: Option<String>,
    pub display_name: String,
}

/// Result of a committed booking.
#[derive(Debug, Clone)]
pub struct BookingCommit {
    pub appointment: Appointment,
    pub slot: AvailabilitySlot,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
}

impl BookAppointmentRequest {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.date, self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub order: SortOrder,
}

impl AppointmentQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.status.map_or(true, |s| appointment.status == s)
            && self.date.map_or(true, |d| appointment.date == d)
    }
}

/// Which side of the appointment a listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantFilter {
    Patient(Uuid),
    Doctor(Uuid),
}

impl ParticipantFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        match self {
            ParticipantFilter::Patient(id) => appointment.patient_id == *id,
            ParticipantFilter::Doctor(id) => appointment.doctor_id == *id,
        }
    }
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DoctorDashboard {
    pub today_confirmed: usize,
    pub upcoming: Vec<Appointment>,
    pub total_upcoming: usize,
    pub next_available_slot: Option<AvailabilitySlot>,
}

/// What `purge_participant` removed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeSummary {
    pub appointments_removed: usize,
    pub slots_removed: usize,
}

/// Snapshot of the booking counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub unavailable: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Slot is no longer available; re-query availability")]
    SlotUnavailable,

    #[error("Timed out waiting for slot {0}")]
    BookingTimeout(SlotKey),

    #[error("Appointment is already {0}")]
    AlreadyTerminal(AppointmentStatus),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("User still has confirmed appointments")]
    ParticipantBusy,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::SupabaseError> for AppointmentError {
    fn from(error: shared_database::SupabaseError) -> Self {
        AppointmentError::DatabaseError(error.to_string())
    }
}
