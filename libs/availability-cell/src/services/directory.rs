// libs/availability-cell/src/services/directory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{DoctorProfile, SlotError};

/// Lookup of doctors allowed to publish slots and receive bookings.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    /// Returns the doctor only while the account exists and is active.
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, SlotError>;

    /// Records an authenticated doctor the directory has not seen yet.
    /// Directories fed by the identity provider ignore this.
    async fn enroll(&self, _doctor: DoctorProfile) -> Result<(), SlotError> {
        Ok(())
    }
}

pub struct SupabaseDoctorDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDoctorDirectory {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, SlotError> {
        debug!("Looking up doctor {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,display_name,email,is_active",
            doctor_id
        );
        let rows: Vec<DoctorProfile> = self.supabase.request(Method::GET, &path, None).await?;

        Ok(rows.into_iter().find(|doctor| doctor.is_active))
    }
}

/// Directory kept in process; used by the in-memory backend and in tests.
#[derive(Default)]
pub struct InMemoryDoctorDirectory {
    doctors: RwLock<HashMap<Uuid, DoctorProfile>>,
}

impl InMemoryDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, doctor: DoctorProfile) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }

    /// Marks a doctor inactive; returns false if unknown.
    pub async fn deactivate(&self, doctor_id: Uuid) -> bool {
        match self.doctors.write().await.get_mut(&doctor_id) {
            Some(doctor) => {
                doctor.is_active = false;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, doctor_id: Uuid) -> Option<DoctorProfile> {
        self.doctors.write().await.remove(&doctor_id)
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, SlotError> {
        Ok(self
            .doctors
            .read()
            .await
            .get(&doctor_id)
            .filter(|doctor| doctor.is_active)
            .cloned())
    }

    /// Known doctors keep their current state, so a deactivated doctor
    /// stays deactivated.
    async fn enroll(&self, doctor: DoctorProfile) -> Result<(), SlotError> {
        self.doctors.write().await.entry(doctor.id).or_insert(doctor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(id: Uuid) -> DoctorProfile {
        DoctorProfile {
            id,
            display_name: "Dr. Ada".to_string(),
            email: Some("ada@example.com".to_string()),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn inactive_and_removed_doctors_are_not_found() {
        let directory = InMemoryDoctorDirectory::new();
        let id = Uuid::new_v4();
        directory.register(doctor(id)).await;

        assert!(directory.find_doctor(id).await.unwrap().is_some());

        assert!(directory.deactivate(id).await);
        assert!(directory.find_doctor(id).await.unwrap().is_none());

        directory.enroll(doctor(id)).await.unwrap();
        assert!(directory.find_doctor(id).await.unwrap().is_none());

        directory.remove(id).await;
        assert!(!directory.deactivate(id).await);
        assert!(directory.find_doctor(Uuid::new_v4()).await.unwrap().is_none());
    }
}
