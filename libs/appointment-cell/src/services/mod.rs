pub mod booking;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod recorder;
pub mod store;
pub mod supabase;

pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use locks::{SlotLockGuard, SlotLockTable};
pub use memory::InMemorySchedulingStore;
pub use recorder::StoreCalendarRecorder;
pub use store::AppointmentStore;
pub use supabase::SupabaseAppointmentStore;
