use std::sync::Arc;

use tracing::info;

use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, InMemorySchedulingStore, StoreCalendarRecorder,
    SupabaseAppointmentStore,
};
use availability_cell::services::{
    AvailabilityService, DoctorDirectory, InMemoryDoctorDirectory, SlotStore,
    SupabaseDoctorDirectory, SupabaseSlotStore,
};
use notification_cell::{EmailNotifier, HttpCalendarSync, NotificationDispatcher, NotificationWorker};
use shared_config::{AppConfig, StorageBackend};
use shared_database::SupabaseClient;

/// The cell services the router mounts.
#[derive(Clone)]
pub struct AppServices {
    pub availability: Arc<AvailabilityService>,
    pub booking: Arc<AppointmentBookingService>,
}

struct Backend {
    slots: Arc<dyn SlotStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn DoctorDirectory>,
}

impl Backend {
    fn from_config(config: &AppConfig) -> Self {
        match config.storage_backend {
            StorageBackend::Memory => {
                info!("Using in-memory scheduling store");
                let store = Arc::new(InMemorySchedulingStore::new());
                Self {
                    slots: store.clone(),
                    appointments: store,
                    directory: Arc::new(InMemoryDoctorDirectory::new()),
                }
            }
            StorageBackend::Supabase => {
                info!("Using Supabase scheduling store at {}", config.supabase_url);
                let supabase = SupabaseClient::new(config);
                Self {
                    slots: Arc::new(SupabaseSlotStore::new(supabase.clone())),
                    appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone())),
                    directory: Arc::new(SupabaseDoctorDirectory::new(supabase)),
                }
            }
        }
    }
}

impl AppServices {
    /// Wires the configured backend. When an email or calendar service is
    /// configured the notification worker is spawned, so this must run
    /// inside a Tokio runtime.
    pub fn build(config: &AppConfig) -> Self {
        let backend = Backend::from_config(config);

        let mut booking = AppointmentBookingService::new(
            backend.appointments.clone(),
            backend.slots.clone(),
            backend.directory.clone(),
            config,
        );
        if let Some(dispatcher) = spawn_notifications(config, backend.appointments.clone()) {
            booking = booking.with_notifications(dispatcher);
        }

        Self {
            availability: Arc::new(AvailabilityService::new(backend.slots, backend.directory)),
            booking: Arc::new(booking),
        }
    }
}

fn spawn_notifications(
    config: &AppConfig,
    appointments: Arc<dyn AppointmentStore>,
) -> Option<NotificationDispatcher> {
    if !config.is_email_configured() && !config.is_calendar_configured() {
        info!("No email or calendar service configured, notifications disabled");
        return None;
    }

    let (dispatcher, receiver) = NotificationDispatcher::channel(config.notification_queue_capacity);
    let mut worker = NotificationWorker::new(receiver, config);

    if let Some(url) = &config.email_service_url {
        worker = worker.with_notifier(Arc::new(EmailNotifier::new(url.clone())));
    }
    if let Some(url) = &config.calendar_service_url {
        worker = worker.with_calendar(
            Arc::new(HttpCalendarSync::new(url.clone())),
            Arc::new(StoreCalendarRecorder::new(appointments)),
        );
    }

    worker.spawn();
    info!("Notification worker spawned (queue capacity {})", config.notification_queue_capacity);
    Some(dispatcher)
}
