// libs/notification-cell/src/services/email.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::error::NotificationError;
use crate::models::{BookingEvent, BookingNotice, Participant};

/// Delivers a booking notification to one participant.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event: BookingEvent,
        participant: &Participant,
        notice: &BookingNotice,
    ) -> Result<(), NotificationError>;
}

/// Posts booking emails to the serverless email service.
pub struct EmailNotifier {
    client: Client,
    endpoint: String,
}

impl EmailNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn payload(
        event: BookingEvent,
        participant: &Participant,
        notice: &BookingNotice,
        to_email: &str,
    ) -> serde_json::Value {
        json!({
            "action": event.email_action(),
            "to_email": to_email,
            "to_name": participant.display_name,
            "doctor_name": notice.doctor_name,
            "patient_name": notice.patient_name,
            "appointment_date": notice.date.format("%Y-%m-%d").to_string(),
            "appointment_time": notice.start_time.format("%H:%M").to_string(),
            "appointment_id": notice.appointment_id,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        event: BookingEvent,
        participant: &Participant,
        notice: &BookingNotice,
    ) -> Result<(), NotificationError> {
        let Some(to_email) = participant.email.as_deref() else {
            debug!(
                "Participant {} has no email address, skipping {:?}",
                participant.user_id, event
            );
            return Ok(());
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&Self::payload(event, participant, notice, to_email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            "Sent {} email for appointment {} to {}",
            event.email_action(),
            notice.appointment_id,
            participant.user_id
        );
        Ok(())
    }
}
