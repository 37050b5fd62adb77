// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Appointment state machine: `confirmed` may become `cancelled` or
/// `completed`; both of those are terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current_status, new_status);

        if current_status.is_terminal() {
            warn!("Transition out of terminal status {} attempted", current_status);
            return Err(AppointmentError::AlreadyTerminal(current_status));
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Confirmed => {
                vec![AppointmentStatus::Cancelled, AppointmentStatus::Completed]
            }
            // Terminal states - no transitions allowed
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => vec![],
        }
    }
}
