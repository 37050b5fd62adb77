// libs/appointment-cell/src/services/memory.rs
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use availability_cell::models::{AvailabilitySlot, SlotError, SlotKey};
use availability_cell::services::SlotStore;
use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookingCommit,
    BookingDraft, ParticipantFilter, PurgeSummary, SortOrder,
};
use crate::services::store::AppointmentStore;

#[derive(Default)]
struct SchedulingState {
    slots: HashMap<Uuid, AvailabilitySlot>,
    slot_ids: HashMap<SlotKey, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

impl SchedulingState {
    fn remove_slot(&mut self, slot_id: Uuid) -> bool {
        match self.slots.remove(&slot_id) {
            Some(slot) => {
                self.slot_ids.remove(&slot.key());
                true
            }
            None => false,
        }
    }

    fn owned_unbooked_slot(&self, slot_id: Uuid) -> Result<&AvailabilitySlot, SlotError> {
        let slot = self.slots.get(&slot_id).ok_or(SlotError::NotFound)?;
        if slot.is_booked {
            return Err(SlotError::SlotBooked);
        }
        Ok(slot)
    }
}

/// Slots and appointments behind one lock, so the joint booking and
/// cancellation transitions are atomic. The lock is held only for the map
/// mutation itself; serialization of competing bookings happens in the
/// coordinator's per-slot lock table.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    state: RwLock<SchedulingState>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for InMemorySchedulingStore {
    async fn insert_slot(&self, key: SlotKey) -> Result<AvailabilitySlot, SlotError> {
        let mut state = self.state.write().await;
        if state.slot_ids.contains_key(&key) {
            return Err(SlotError::Overlap(key));
        }

        let now = Utc::now();
        let slot = AvailabilitySlot {
            id: Uuid::new_v4(),
            doctor_id: key.doctor_id,
            date: key.date,
            start_time: key.start_time,
            end_time: key.end_time,
            is_booked: false,
            created_at: now,
            updated_at: now,
        };

        state.slot_ids.insert(key, slot.id);
        state.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>, SlotError> {
        Ok(self.state.read().await.slots.get(&slot_id).cloned())
    }

    async fn find_slot(&self, key: &SlotKey) -> Result<Option<AvailabilitySlot>, SlotError> {
        let state = self.state.read().await;
        Ok(state
            .slot_ids
            .get(key)
            .and_then(|id| state.slots.get(id))
            .cloned())
    }

    async fn list_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilitySlot>, SlotError> {
        let state = self.state.read().await;
        let mut slots: Vec<AvailabilitySlot> = state
            .slots
            .values()
            .filter(|slot| slot.doctor_id == doctor_id)
            .filter(|slot| date.map_or(true, |d| slot.date == d))
            .cloned()
            .collect();

        slots.sort_by_key(|slot| (slot.date, slot.start_time, slot.end_time));
        Ok(slots)
    }

    async fn update_unbooked_slot(
        &self,
        slot_id: Uuid,
        key: SlotKey,
    ) -> Result<AvailabilitySlot, SlotError> {
        let mut state = self.state.write().await;
        let old_key = state.owned_unbooked_slot(slot_id)?.key();

        if old_key != key {
            if state.slot_ids.get(&key).is_some_and(|id| *id != slot_id) {
                return Err(SlotError::Overlap(key));
            }
            state.slot_ids.remove(&old_key);
            state.slot_ids.insert(key, slot_id);
        }

        let slot = state.slots.get_mut(&slot_id).ok_or(SlotError::NotFound)?;
        slot.date = key.date;
        slot.start_time = key.start_time;
        slot.end_time = key.end_time;
        slot.updated_at = Utc::now();

        Ok(slot.clone())
    }

    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> Result<(), SlotError> {
        let mut state = self.state.write().await;
        state.owned_unbooked_slot(slot_id)?;
        if state.appointments.values().any(|a| a.slot_id == slot_id) {
            debug!("Slot {} is still referenced by appointment history", slot_id);
            return Err(SlotError::InUse);
        }
        state.remove_slot(slot_id);
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for InMemorySchedulingStore {
    async fn commit_booking(
        &self,
        key: &SlotKey,
        draft: BookingDraft,
        now: DateTime<Utc>,
    ) -> Result<BookingCommit, AppointmentError> {
        let mut state = self.state.write().await;

        let slot_id = *state
            .slot_ids
            .get(key)
            .ok_or(AppointmentError::SlotUnavailable)?;
        let slot = state
            .slots
            .get_mut(&slot_id)
            .ok_or(AppointmentError::SlotUnavailable)?;

        if !slot.is_available(now) {
            debug!("Slot {} is booked or has started", slot_id);
            return Err(AppointmentError::SlotUnavailable);
        }

        slot.is_booked = true;
        slot.updated_at = now;
        let slot = slot.clone();

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: draft.patient_id,
            doctor_id: slot.doctor_id,
            slot_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            status: AppointmentStatus::Confirmed,
            notes: draft.notes,
            doctor_calendar_event_id: None,
            patient_calendar_event_id: None,
            created_at: now,
            updated_at: now,
        };
        state.appointments.insert(appointment.id, appointment.clone());

        Ok(BookingCommit { appointment, slot })
    }

    async fn commit_cancellation(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let appointment = state
            .appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound)?;
        if appointment.status.is_terminal() {
            return Err(AppointmentError::AlreadyTerminal(appointment.status));
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = now;
        let appointment = appointment.clone();

        if let Some(slot) = state.slots.get_mut(&appointment.slot_id) {
            slot.is_booked = false;
            slot.updated_at = now;
        }

        Ok(appointment)
    }

    async fn commit_completion(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut state = self.state.write().await;

        let appointment = state
            .appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound)?;
        if appointment.status.is_terminal() {
            return Err(AppointmentError::AlreadyTerminal(appointment.status));
        }

        appointment.status = AppointmentStatus::Completed;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_appointments(
        &self,
        participant: ParticipantFilter,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let state = self.state.read().await;
        let mut appointments: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| participant.matches(a) && query.matches(a))
            .cloned()
            .collect();

        appointments.sort_by_key(Appointment::schedule_order);
        if query.order == SortOrder::Desc {
            appointments.reverse();
        }

        Ok(appointments)
    }

    async fn update_notes(&self, appointment_id: Uuid, notes: String) -> Result<Appointment, AppointmentError> {
        let mut state = self.state.write().await;
        let appointment = state
            .appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound)?;

        appointment.notes = notes;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn record_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
        event_id: String,
    ) -> Result<(), AppointmentError> {
        let mut state = self.state.write().await;
        let appointment = state
            .appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound)?;

        match role {
            Role::Doctor => appointment.doctor_calendar_event_id = Some(event_id),
            Role::Patient => appointment.patient_calendar_event_id = Some(event_id),
        }
        Ok(())
    }

    async fn purge_participant(&self, user_id: Uuid) -> Result<PurgeSummary, AppointmentError> {
        let mut state = self.state.write().await;

        let busy = state
            .appointments
            .values()
            .any(|a| a.involves(user_id) && a.status == AppointmentStatus::Confirmed);
        if busy {
            return Err(AppointmentError::ParticipantBusy);
        }

        let removed: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.involves(user_id))
            .cloned()
            .collect();

        let mut doomed_slots: HashSet<Uuid> = removed
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .map(|a| a.slot_id)
            .collect();
        doomed_slots.extend(
            state
                .slots
                .values()
                .filter(|slot| slot.doctor_id == user_id)
                .map(|slot| slot.id),
        );

        for appointment in &removed {
            state.appointments.remove(&appointment.id);
        }
        // Slots still referenced by other users' history stay.
        doomed_slots.retain(|slot_id| !state.appointments.values().any(|a| a.slot_id == *slot_id));
        let slots_removed = doomed_slots
            .into_iter()
            .filter(|slot_id| state.remove_slot(*slot_id))
            .count();

        let summary = PurgeSummary {
            appointments_removed: removed.len(),
            slots_removed,
        };
        info!("Purged participant {}: {:?}", user_id, summary);
        Ok(summary)
    }
}
