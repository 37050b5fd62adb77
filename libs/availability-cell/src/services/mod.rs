pub mod availability;
pub mod directory;
pub mod store;
pub mod supabase;
pub mod validation;

pub use availability::AvailabilityService;
pub use directory::{DoctorDirectory, InMemoryDoctorDirectory, SupabaseDoctorDirectory};
pub use store::SlotStore;
pub use supabase::SupabaseSlotStore;
