// libs/availability-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AvailabilitySlot, CreateSlotRequest, DoctorProfile, SlotError, SlotKey, SlotListQuery,
    SlotResponse, UpdateSlotRequest,
};
use crate::services::directory::DoctorDirectory;
use crate::services::store::SlotStore;
use crate::services::validation::validate_slot_window;

/// Doctor-facing slot management and patient-facing slot discovery.
pub struct AvailabilityService {
    store: Arc<dyn SlotStore>,
    directory: Arc<dyn DoctorDirectory>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn SlotStore>, directory: Arc<dyn DoctorDirectory>) -> Self {
        Self { store, directory }
    }

    /// Publish a new unbooked slot for the calling doctor.
    pub async fn create_slot(
        &self,
        doctor: DoctorProfile,
        request: CreateSlotRequest,
    ) -> Result<AvailabilitySlot, SlotError> {
        let doctor_id = doctor.id;
        let key = SlotKey::new(doctor_id, request.date, request.start_time, request.end_time);
        debug!("Creating availability slot {}", key);

        validate_slot_window(&key, Utc::now())?;
        self.directory.enroll(doctor).await?;
        self.ensure_active_doctor(doctor_id).await?;

        let slot = self.store.insert_slot(key).await?;
        info!("Created availability slot {} ({})", slot.id, key);

        Ok(slot)
    }

    /// Fetch a slot owned by `doctor_id`; other doctors' slots are invisible.
    pub async fn get_owned_slot(
        &self,
        doctor_id: Uuid,
        slot_id: Uuid,
    ) -> Result<AvailabilitySlot, SlotError> {
        self.store
            .get_slot(slot_id)
            .await?
            .filter(|slot| slot.doctor_id == doctor_id)
            .ok_or(SlotError::NotFound)
    }

    /// The doctor's slots ordered by date and start time. Availability is
    /// evaluated lazily against the clock at call time.
    pub async fn list_slots(
        &self,
        doctor_id: Uuid,
        query: SlotListQuery,
    ) -> Result<impl Iterator<Item = SlotResponse>, SlotError> {
        let now = Utc::now();
        let available_only = query.available_only.unwrap_or(false);
        let slots = self.store.list_slots(doctor_id, query.date).await?;

        Ok(slots
            .into_iter()
            .filter(move |slot| !available_only || slot.is_available(now))
            .map(move |slot| SlotResponse::at(slot, now)))
    }

    /// Bookable slots of an active doctor, for patients.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<SlotResponse>, SlotError> {
        self.ensure_active_doctor(doctor_id).await?;

        let query = SlotListQuery {
            date,
            available_only: Some(true),
        };
        Ok(self.list_slots(doctor_id, query).await?.collect())
    }

    /// Re-time an unbooked slot. The resulting identity is validated as if
    /// the slot were being created.
    pub async fn update_slot(
        &self,
        doctor_id: Uuid,
        slot_id: Uuid,
        request: UpdateSlotRequest,
    ) -> Result<AvailabilitySlot, SlotError> {
        let current = self.get_owned_slot(doctor_id, slot_id).await?;
        if current.is_booked {
            return Err(SlotError::SlotBooked);
        }
        if request.is_empty() {
            return Ok(current);
        }

        let key = SlotKey::new(
            doctor_id,
            request.date.unwrap_or(current.date),
            request.start_time.unwrap_or(current.start_time),
            request.end_time.unwrap_or(current.end_time),
        );
        validate_slot_window(&key, Utc::now())?;

        if key != current.key() {
            if let Some(existing) = self.store.find_slot(&key).await? {
                if existing.id != slot_id {
                    return Err(SlotError::Overlap(key));
                }
            }
        }

        let slot = self.store.update_unbooked_slot(slot_id, key).await?;
        info!("Updated availability slot {} to {}", slot_id, key);

        Ok(slot)
    }

    pub async fn delete_slot(&self, doctor_id: Uuid, slot_id: Uuid) -> Result<(), SlotError> {
        let current = self.get_owned_slot(doctor_id, slot_id).await?;
        if current.is_booked {
            return Err(SlotError::SlotBooked);
        }

        self.store.delete_unbooked_slot(slot_id).await?;
        info!("Deleted availability slot {}", slot_id);

        Ok(())
    }

    async fn ensure_active_doctor(&self, doctor_id: Uuid) -> Result<(), SlotError> {
        match self.directory.find_doctor(doctor_id).await? {
            Some(_) => Ok(()),
            None => Err(SlotError::DoctorNotFound),
        }
    }
}
