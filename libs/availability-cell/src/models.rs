// libs/availability-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE SLOT MODELS
// ==============================================================================

/// A doctor-published window that a patient can turn into an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    /// Slot dates and times are wall-clock UTC.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.key().starts_at()
    }

    /// Free and still in the future; computed at query time, never stored.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.is_booked && self.starts_at() > now
    }
}

/// Identity of a slot: no two slots may share it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotKey {
    pub fn new(doctor_id: Uuid, date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            doctor_id,
            date,
            start_time,
            end_time,
        }
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.end_time))
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}-{}",
            self.doctor_id,
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Client-facing slot representation with the derived availability flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResponse {
    #[serde(flatten)]
    pub slot: AvailabilitySlot,
    pub is_available: bool,
}

impl SlotResponse {
    pub fn at(slot: AvailabilitySlot, now: DateTime<Utc>) -> Self {
        let is_available = slot.is_available(now);
        Self { slot, is_available }
    }
}

/// Directory entry for a doctor who may publish slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub is_active: bool,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Partial update of an unbooked slot; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl UpdateSlotRequest {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.start_time.is_none() && self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotListQuery {
    pub date: Option<NaiveDate>,
    pub available_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SlotError {
    #[error("End time must be after start time")]
    InvalidRange,

    #[error("Cannot create availability slots in the past")]
    InThePast,

    #[error("An availability slot already exists for {0}")]
    Overlap(SlotKey),

    #[error("Cannot modify a booked slot")]
    SlotBooked,

    #[error("Availability slot is referenced by appointment history")]
    InUse,

    #[error("Availability slot not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::SupabaseError> for SlotError {
    fn from(error: shared_database::SupabaseError) -> Self {
        SlotError::DatabaseError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot_at(start: DateTime<Utc>, booked: bool) -> AvailabilitySlot {
        AvailabilitySlot {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            date: start.date_naive(),
            start_time: start.time(),
            end_time: start.time() + Duration::minutes(30),
            is_booked: booked,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn availability_is_derived_from_clock_and_flag() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();

        assert!(slot_at(ten, false).is_available(now));
        assert!(!slot_at(ten, true).is_available(now));
        assert!(!slot_at(ten, false).is_available(ten));
        assert!(!slot_at(ten, false).is_available(ten + Duration::minutes(1)));
    }

    #[test]
    fn response_flattens_slot_fields() {
        let now = Utc::now();
        let slot = slot_at(now + Duration::days(1), false);
        let value = serde_json::to_value(SlotResponse::at(slot.clone(), now)).unwrap();

        assert_eq!(value["id"], serde_json::json!(slot.id));
        assert_eq!(value["is_available"], true);
        assert_eq!(value["is_booked"], false);
    }
}
