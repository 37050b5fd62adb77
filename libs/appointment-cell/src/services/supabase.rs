// libs/appointment-cell/src/services/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::models::{AvailabilitySlot, SlotKey};
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookingCommit,
    BookingDraft, ParticipantFilter, PurgeSummary, SortOrder,
};
use crate::services::store::AppointmentStore;

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, Deserialize)]
struct CommitRow {
    appointment: Appointment,
    slot: AvailabilitySlot,
}

/// Appointment store over PostgREST. The joint transitions run inside the
/// SQL functions `book_availability_slot` and `cancel_appointment`, which
/// lock the slot row with `SELECT ... FOR UPDATE` under a bounded
/// `lock_timeout`.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    /// Translates exceptions raised by the SQL functions.
    fn map_rpc_error(error: SupabaseError, key: Option<&SlotKey>) -> AppointmentError {
        if let (Some(LOCK_NOT_AVAILABLE), Some(key)) = (error.exception_code(), key) {
            return AppointmentError::BookingTimeout(*key);
        }

        let mapped = match error.exception_message() {
            Some("SLOT_UNAVAILABLE") => Some(AppointmentError::SlotUnavailable),
            Some("APPOINTMENT_NOT_FOUND") => Some(AppointmentError::NotFound),
            Some("PARTICIPANT_BUSY") => Some(AppointmentError::ParticipantBusy),
            Some(message) if message.starts_with("ALREADY_TERMINAL") => {
                let status = message
                    .split_once(':')
                    .and_then(|(_, s)| serde_json::from_value(json!(s.trim())).ok())
                    .unwrap_or(AppointmentStatus::Cancelled);
                Some(AppointmentError::AlreadyTerminal(status))
            }
            _ => None,
        };

        mapped.unwrap_or_else(|| error.into())
    }

    /// A conditional write matched nothing: missing, or no longer confirmed.
    async fn explain_missing_row(&self, appointment_id: Uuid) -> AppointmentError {
        match self.get_appointment(appointment_id).await {
            Ok(Some(appointment)) => AppointmentError::AlreadyTerminal(appointment.status),
            Ok(None) => AppointmentError::NotFound,
            Err(e) => e,
        }
    }

    async fn patch_returning(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, path, Some(body))
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn commit_booking(
        &self,
        key: &SlotKey,
        draft: BookingDraft,
        now: DateTime<Utc>,
    ) -> Result<BookingCommit, AppointmentError> {
        debug!("Committing booking for slot {} via RPC", key);

        let args = json!({
            "p_doctor_id": key.doctor_id,
            "p_date": key.date.to_string(),
            "p_start_time": key.start_time.format("%H:%M:%S").to_string(),
            "p_end_time": key.end_time.format("%H:%M:%S").to_string(),
            "p_patient_id": draft.patient_id,
            "p_notes": draft.notes,
            "p_now": now.to_rfc3339(),
        });

        let row: CommitRow = self
            .supabase
            .rpc("book_availability_slot", args)
            .await
            .map_err(|e| Self::map_rpc_error(e, Some(key)))?;

        Ok(BookingCommit {
            appointment: row.appointment,
            slot: row.slot,
        })
    }

    async fn commit_cancellation(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.supabase
            .rpc("cancel_appointment", json!({ "p_appointment_id": appointment_id }))
            .await
            .map_err(|e| Self::map_rpc_error(e, None))
    }

    async fn commit_completion(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("{}?id=eq.{}&status=eq.confirmed", APPOINTMENTS_PATH, appointment_id);
        let body = json!({
            "status": AppointmentStatus::Completed,
            "updated_at": Utc::now().to_rfc3339(),
        });

        match self.patch_returning(&path, body).await? {
            Some(appointment) => Ok(appointment),
            None => {
                warn!("Guarded completion of appointment {} matched no row", appointment_id);
                Err(self.explain_missing_row(appointment_id).await)
            }
        }
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_appointments(
        &self,
        participant: ParticipantFilter,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = match participant {
            ParticipantFilter::Patient(id) => format!("{}?patient_id=eq.{}", APPOINTMENTS_PATH, id),
            ParticipantFilter::Doctor(id) => format!("{}?doctor_id=eq.{}", APPOINTMENTS_PATH, id),
        };
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(date) = query.date {
            path.push_str(&format!("&date=eq.{}", date));
        }
        path.push_str(match query.order {
            SortOrder::Asc => "&order=date.asc,start_time.asc",
            SortOrder::Desc => "&order=date.desc,start_time.desc",
        });

        Ok(self.supabase.request(Method::GET, &path, None).await?)
    }

    async fn update_notes(&self, appointment_id: Uuid, notes: String) -> Result<Appointment, AppointmentError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, appointment_id);
        let body = json!({
            "notes": notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_returning(&path, body)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    async fn record_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
        event_id: String,
    ) -> Result<(), AppointmentError> {
        let column = match role {
            Role::Doctor => "doctor_calendar_event_id",
            Role::Patient => "patient_calendar_event_id",
        };
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, appointment_id);

        self.patch_returning(&path, json!({ column: event_id }))
            .await?
            .map(|_| ())
            .ok_or(AppointmentError::NotFound)
    }

    async fn purge_participant(&self, user_id: Uuid) -> Result<PurgeSummary, AppointmentError> {
        self.supabase
            .rpc("purge_participant", json!({ "p_user_id": user_id }))
            .await
            .map_err(|e| Self::map_rpc_error(e, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime};

    fn exception(code: &str, message: &str) -> SupabaseError {
        SupabaseError::Exception {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    fn key() -> SlotKey {
        SlotKey::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        )
    }

    #[test]
    fn maps_function_exceptions() {
        assert_matches!(
            SupabaseAppointmentStore::map_rpc_error(exception("P0001", "SLOT_UNAVAILABLE"), None),
            AppointmentError::SlotUnavailable
        );
        assert_matches!(
            SupabaseAppointmentStore::map_rpc_error(exception("P0001", "ALREADY_TERMINAL:completed"), None),
            AppointmentError::AlreadyTerminal(AppointmentStatus::Completed)
        );
        assert_matches!(
            SupabaseAppointmentStore::map_rpc_error(exception("P0001", "PARTICIPANT_BUSY"), None),
            AppointmentError::ParticipantBusy
        );
    }

    #[test]
    fn lock_timeout_becomes_booking_timeout() {
        let slot = key();
        assert_matches!(
            SupabaseAppointmentStore::map_rpc_error(
                exception("55P03", "canceling statement due to lock timeout"),
                Some(&slot)
            ),
            AppointmentError::BookingTimeout(k) if k == slot
        );
    }
}
