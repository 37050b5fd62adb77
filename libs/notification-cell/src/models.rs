// libs/notification-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::Role;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingEvent {
    BookingCreated,
    BookingCancelled,
}

impl BookingEvent {
    /// Action name understood by the email service.
    pub fn email_action(&self) -> &'static str {
        match self {
            BookingEvent::BookingCreated => "BOOKING_CONFIRMATION",
            BookingEvent::BookingCancelled => "BOOKING_CANCELLATION",
        }
    }
}

/// One side of an appointment, as far as notifications are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub user_id: Uuid,
    pub role: Role,
    pub email: Option<String>,
    pub display_name: String,
}

/// Snapshot of the appointment a notification is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingNotice {
    pub appointment_id: Uuid,
    pub doctor_name: String,
    pub patient_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
    pub doctor_calendar_event_id: Option<String>,
    pub patient_calendar_event_id: Option<String>,
}

impl BookingNotice {
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.end_time))
    }

    /// The stored external event belonging to `role`'s calendar.
    pub fn calendar_event_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Doctor => self.doctor_calendar_event_id.as_deref(),
            Role::Patient => self.patient_calendar_event_id.as_deref(),
        }
    }
}

/// A unit of work for the notification worker.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub event: BookingEvent,
    pub participant: Participant,
    pub notice: BookingNotice,
}

impl NotificationJob {
    pub fn new(event: BookingEvent, participant: Participant, notice: BookingNotice) -> Self {
        Self {
            event,
            participant,
            notice,
        }
    }
}
