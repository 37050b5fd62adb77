// libs/notification-cell/src/services/calendar.rs
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::Role;

use crate::error::NotificationError;
use crate::models::{BookingNotice, Participant};

/// External calendar integration for one participant at a time.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Creates an event and returns its opaque id. `None` means the
    /// participant has no connected calendar.
    async fn create_event(
        &self,
        participant: &Participant,
        notice: &BookingNotice,
    ) -> Result<Option<String>, NotificationError>;

    async fn delete_event(
        &self,
        participant: &Participant,
        event_id: &str,
    ) -> Result<(), NotificationError>;
}

/// Persists calendar event ids returned by `CalendarSync` on the appointment.
#[async_trait]
pub trait CalendarEventRecorder: Send + Sync {
    async fn record_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
        event_id: String,
    ) -> Result<(), NotificationError>;

    /// The event id currently stored for `role` on the appointment.
    async fn stored_calendar_event(
        &self,
        appointment_id: Uuid,
        role: Role,
    ) -> Result<Option<String>, NotificationError>;
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: Option<String>,
}

/// Talks to the calendar gateway that holds participants' OAuth grants.
pub struct HttpCalendarSync {
    client: Client,
    base_url: String,
}

impl HttpCalendarSync {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn event_body(participant: &Participant, notice: &BookingNotice) -> serde_json::Value {
        let (summary, mut description) = match participant.role {
            Role::Doctor => (
                format!("Appointment with {}", notice.patient_name),
                format!("Patient: {}\n", notice.patient_name),
            ),
            Role::Patient => (
                format!("Appointment with Dr. {}", notice.doctor_name),
                format!("Doctor: Dr. {}\n", notice.doctor_name),
            ),
        };

        if let Some(notes) = notice.notes.as_deref().filter(|n| !n.is_empty()) {
            description.push_str(&format!("Notes: {}\n", notes));
        }
        description.push_str(&format!("Appointment ID: {}", notice.appointment_id));

        json!({
            "summary": summary,
            "description": description,
            "start": { "dateTime": notice.starts_at().to_rfc3339(), "timeZone": "UTC" },
            "end": { "dateTime": notice.ends_at().to_rfc3339(), "timeZone": "UTC" },
        })
    }
}

#[async_trait]
impl CalendarSync for HttpCalendarSync {
    async fn create_event(
        &self,
        participant: &Participant,
        notice: &BookingNotice,
    ) -> Result<Option<String>, NotificationError> {
        let url = format!("{}/users/{}/events", self.base_url, participant.user_id);
        let response = self
            .client
            .post(&url)
            .json(&Self::event_body(participant, notice))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("No calendar connected for {}", participant.user_id);
                Ok(None)
            }
            status if status.is_success() => {
                let created: CreatedEvent = response.json().await?;
                if let Some(id) = &created.id {
                    info!("Created calendar event {} for {}", id, participant.user_id);
                }
                Ok(created.id)
            }
            status => Err(NotificationError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn delete_event(
        &self,
        participant: &Participant,
        event_id: &str,
    ) -> Result<(), NotificationError> {
        let url = format!(
            "{}/users/{}/events/{}",
            self.base_url, participant.user_id, event_id
        );
        let response = self.client.delete(&url).send().await?;

        match response.status() {
            // Already gone or calendar disconnected; nothing left to clean up.
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(()),
            status if status.is_success() => {
                info!("Deleted calendar event {} for {}", event_id, participant.user_id);
                Ok(())
            }
            status => Err(NotificationError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
