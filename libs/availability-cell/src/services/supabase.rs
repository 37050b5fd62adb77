// libs/availability-cell/src/services/supabase.rs
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{SupabaseClient, SupabaseError};

use crate::models::{AvailabilitySlot, SlotError, SlotKey};
use crate::services::store::SlotStore;

const SLOTS_PATH: &str = "/rest/v1/availability_slots";

/// PostgREST-backed slot store. The unique constraint on
/// `(doctor_id, date, start_time, end_time)` enforces slot identity and the
/// `is_booked=eq.false` filter on writes is the booked guard.
pub struct SupabaseSlotStore {
    supabase: SupabaseClient,
}

impl SupabaseSlotStore {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    fn key_body(key: &SlotKey) -> serde_json::Value {
        json!({
            "doctor_id": key.doctor_id,
            "date": key.date.to_string(),
            "start_time": key.start_time.format("%H:%M:%S").to_string(),
            "end_time": key.end_time.format("%H:%M:%S").to_string(),
        })
    }

    fn map_write_error(error: SupabaseError, key: &SlotKey) -> SlotError {
        match error {
            SupabaseError::Conflict(_) => SlotError::Overlap(*key),
            other => other.into(),
        }
    }

    /// A guarded write matched no row: tell a missing slot from a booked one.
    async fn explain_missing_row(&self, slot_id: Uuid) -> SlotError {
        match self.get_slot(slot_id).await {
            Ok(Some(slot)) if slot.is_booked => SlotError::SlotBooked,
            Ok(_) => SlotError::NotFound,
            Err(e) => e,
        }
    }
}

#[async_trait]
impl SlotStore for SupabaseSlotStore {
    async fn insert_slot(&self, key: SlotKey) -> Result<AvailabilitySlot, SlotError> {
        debug!("Inserting availability slot {}", key);

        let mut body = Self::key_body(&key);
        body["is_booked"] = json!(false);

        let rows: Vec<AvailabilitySlot> = self
            .supabase
            .request_returning(Method::POST, SLOTS_PATH, Some(body))
            .await
            .map_err(|e| Self::map_write_error(e, &key))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SlotError::DatabaseError("Insert returned no row".to_string()))
    }

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>, SlotError> {
        let path = format!("{}?id=eq.{}", SLOTS_PATH, slot_id);
        let rows: Vec<AvailabilitySlot> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_slot(&self, key: &SlotKey) -> Result<Option<AvailabilitySlot>, SlotError> {
        let path = format!(
            "{}?doctor_id=eq.{}&date=eq.{}&start_time=eq.{}&end_time=eq.{}",
            SLOTS_PATH,
            key.doctor_id,
            key.date,
            key.start_time.format("%H:%M:%S"),
            key.end_time.format("%H:%M:%S"),
        );
        let rows: Vec<AvailabilitySlot> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilitySlot>, SlotError> {
        let mut path = format!("{}?doctor_id=eq.{}", SLOTS_PATH, doctor_id);
        if let Some(date) = date {
            path.push_str(&format!("&date=eq.{}", date));
        }
        path.push_str("&order=date.asc,start_time.asc");

        Ok(self.supabase.request(Method::GET, &path, None).await?)
    }

    async fn update_unbooked_slot(
        &self,
        slot_id: Uuid,
        key: SlotKey,
    ) -> Result<AvailabilitySlot, SlotError> {
        let path = format!("{}?id=eq.{}&is_booked=eq.false", SLOTS_PATH, slot_id);
        let mut body = Self::key_body(&key);
        body["updated_at"] = json!(Utc::now().to_rfc3339());

        let rows: Vec<AvailabilitySlot> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| Self::map_write_error(e, &key))?;

        match rows.into_iter().next() {
            Some(slot) => Ok(slot),
            None => {
                warn!("Guarded update of slot {} matched no row", slot_id);
                Err(self.explain_missing_row(slot_id).await)
            }
        }
    }

    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> Result<(), SlotError> {
        let path = format!("{}?id=eq.{}&is_booked=eq.false", SLOTS_PATH, slot_id);
        let rows: Vec<AvailabilitySlot> = self
            .supabase
            .request_returning(Method::DELETE, &path, None)
            .await
            .map_err(|e| match e {
                SupabaseError::Referenced(_) => SlotError::InUse,
                other => other.into(),
            })?;

        if rows.is_empty() {
            warn!("Guarded delete of slot {} matched no row", slot_id);
            return Err(self.explain_missing_row(slot_id).await);
        }

        Ok(())
    }
}
