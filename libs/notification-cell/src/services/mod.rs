pub mod calendar;
pub mod dispatcher;
pub mod email;
pub mod retry;

pub use calendar::{CalendarEventRecorder, CalendarSync, HttpCalendarSync};
pub use dispatcher::{NotificationDispatcher, NotificationWorker};
pub use email::{EmailNotifier, Notifier};
pub use retry::{retry_with_backoff, RetryPolicy};
