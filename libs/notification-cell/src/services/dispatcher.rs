// libs/notification-cell/src/services/dispatcher.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;

use crate::error::NotificationError;
use crate::models::{BookingEvent, NotificationJob};
use crate::services::calendar::{CalendarEventRecorder, CalendarSync};
use crate::services::email::Notifier;
use crate::services::retry::{retry_with_backoff, RetryPolicy};

/// Producer side of the notification queue. Cloning is cheap; every clone
/// feeds the same worker.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NotificationJob>,
}

impl NotificationDispatcher {
    /// Creates the queue and hands back the receiving end for a worker.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Never waits: a full or closed queue drops the job and logs it.
    pub fn dispatch(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let appointment_id = job.notice.appointment_id;
        let event = job.event;

        match self.sender.try_send(job) {
            Ok(()) => {
                debug!("Queued {:?} for appointment {}", event, appointment_id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Notification queue full, dropping {:?} for appointment {}",
                    event, appointment_id
                );
                Err(NotificationError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                error!(
                    "Notification queue closed, dropping {:?} for appointment {}",
                    event, appointment_id
                );
                Err(NotificationError::QueueClosed)
            }
        }
    }
}

/// Drains the notification queue: calendar sync first, then the notifier.
/// Each collaborator call runs under its own timeout and retry budget;
/// failures are logged and the job moves on.
pub struct NotificationWorker {
    receiver: mpsc::Receiver<NotificationJob>,
    notifier: Option<Arc<dyn Notifier>>,
    calendar: Option<Arc<dyn CalendarSync>>,
    recorder: Option<Arc<dyn CalendarEventRecorder>>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl NotificationWorker {
    pub fn new(receiver: mpsc::Receiver<NotificationJob>, config: &AppConfig) -> Self {
        Self {
            receiver,
            notifier: None,
            calendar: None,
            recorder: None,
            policy: RetryPolicy::with_max_retries(config.notification_max_retries),
            attempt_timeout: Duration::from_millis(config.notification_timeout_ms),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_calendar(
        mut self,
        calendar: Arc<dyn CalendarSync>,
        recorder: Arc<dyn CalendarEventRecorder>,
    ) -> Self {
        self.calendar = Some(calendar);
        self.recorder = Some(recorder);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every dispatcher handle has been dropped.
    pub async fn run(mut self) {
        info!("Notification worker started");

        while let Some(job) = self.receiver.recv().await {
            self.process(job).await;
        }

        info!("Notification queue closed, worker stopping");
    }

    #[instrument(skip(self, job), fields(appointment_id = %job.notice.appointment_id, event = ?job.event, user_id = %job.participant.user_id))]
    async fn process(&self, job: NotificationJob) {
        if let Some(calendar) = &self.calendar {
            self.sync_calendar(calendar.as_ref(), &job).await;
        }

        if let Some(notifier) = &self.notifier {
            let outcome = self
                .attempt(|| notifier.notify(job.event, &job.participant, &job.notice))
                .await;
            if let Err(e) = outcome {
                error!("Giving up on {:?} notification: {}", job.event, e);
            }
        }
    }

    async fn sync_calendar(&self, calendar: &dyn CalendarSync, job: &NotificationJob) {
        match job.event {
            BookingEvent::BookingCreated => {
                let created = self
                    .attempt(|| calendar.create_event(&job.participant, &job.notice))
                    .await;

                match created {
                    Ok(Some(event_id)) => {
                        if let Some(recorder) = &self.recorder {
                            if let Err(e) = recorder
                                .record_calendar_event(
                                    job.notice.appointment_id,
                                    job.participant.role,
                                    event_id,
                                )
                                .await
                            {
                                warn!("Calendar event created but not recorded: {}", e);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!("Giving up on calendar event creation: {}", e),
                }
            }
            BookingEvent::BookingCancelled => {
                // The creation job may have recorded the id after this notice was built.
                let Some(event_id) = self.cancelled_event_id(job).await else {
                    return;
                };

                if let Err(e) = self
                    .attempt(|| calendar.delete_event(&job.participant, &event_id))
                    .await
                {
                    error!("Giving up on calendar event {} deletion: {}", event_id, e);
                }
            }
        }
    }

    async fn cancelled_event_id(&self, job: &NotificationJob) -> Option<String> {
        let role = job.participant.role;
        let stored = match &self.recorder {
            Some(recorder) => recorder
                .stored_calendar_event(job.notice.appointment_id, role)
                .await
                .unwrap_or_else(|e| {
                    warn!("Could not read stored calendar event: {}", e);
                    None
                }),
            None => None,
        };

        stored.or_else(|| job.notice.calendar_event_for(role).map(str::to_string))
    }

    /// One collaborator call with per-attempt timeout and backoff.
    async fn attempt<F, Fut, T>(&self, mut operation: F) -> Result<T, NotificationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NotificationError>>,
    {
        let limit = self.attempt_timeout;
        retry_with_backoff(&self.policy, || {
            let call = operation();
            async move {
                timeout(limit, call).await.unwrap_or(Err(NotificationError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }))
            }
        })
        .await
    }
}
