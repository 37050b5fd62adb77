// libs/availability-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{AvailabilitySlot, SlotError, SlotKey};

/// Persistence for availability slots.
///
/// Implementations own the booked guard: `update_unbooked_slot` and
/// `delete_unbooked_slot` must check `is_booked` and mutate in one atomic
/// step so a concurrent booking can never be overwritten. The booked flag
/// itself is only ever flipped by the booking and cancellation
/// transactions of the appointment store.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Inserts an unbooked slot; a taken identity yields `SlotError::Overlap`.
    async fn insert_slot(&self, key: SlotKey) -> Result<AvailabilitySlot, SlotError>;

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>, SlotError>;

    async fn find_slot(&self, key: &SlotKey) -> Result<Option<AvailabilitySlot>, SlotError>;

    /// The doctor's slots ordered by date then start time.
    async fn list_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilitySlot>, SlotError>;

    /// Moves an unbooked slot to a new identity.
    async fn update_unbooked_slot(
        &self,
        slot_id: Uuid,
        key: SlotKey,
    ) -> Result<AvailabilitySlot, SlotError>;

    async fn delete_unbooked_slot(&self, slot_id: Uuid) -> Result<(), SlotError>;
}
