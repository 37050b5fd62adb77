// libs/appointment-cell/src/services/recorder.rs
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use notification_cell::{CalendarEventRecorder, NotificationError};
use shared_models::auth::Role;

use crate::services::store::AppointmentStore;

/// Writes calendar event ids from the notification worker back onto appointments.
pub struct StoreCalendarRecorder {
    store: Arc<dyn AppointmentStore>,
}

impl StoreCalendarRecorder {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CalendarEventRecorder for StoreCalendarRecorder {
    async fn record_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
        event_id: String,
    ) -> Result<(), NotificationError> {
        self.store
            .record_calendar_event(appointment_id, role, event_id)
            .await
            .map_err(|e| NotificationError::Recorder(e.to_string()))
    }

    async fn stored_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
    ) -> Result<Option<String>, NotificationError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await
            .map_err(|e| NotificationError::Recorder(e.to_string()))?;

        Ok(appointment.and_then(|a| match role {
            Role::Doctor => a.doctor_calendar_event_id,
            Role::Patient => a.patient_calendar_event_id,
        }))
    }
}
