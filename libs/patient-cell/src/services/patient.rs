use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::lookup::PatientStatus;
use shared_models::SchedulingError;

use crate::models::{PatientRecord, PatientStatusUpdate};

/// External patient registry. Only the status flag is owned elsewhere;
/// the scheduling core flips it on release and reactivation.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn set_status(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        status: PatientStatus,
    ) -> Result<(), SchedulingError>;
}

pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn set_status(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        status: PatientStatus,
    ) -> Result<(), SchedulingError> {
        debug!("Setting patient {} status to {}", patient_id, status);

        let update = PatientStatusUpdate {
            status,
            updated_at: Utc::now(),
        };
        let path = format!("/rest/v1/patients?id=eq.{}&clinic_id=eq.{}", patient_id, clinic_id);
        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, &update)
            .await
            .map_err(|e| {
                error!("Failed to update patient {} status: {}", patient_id, e);
                SchedulingError::Dependency(format!("Patient directory unavailable: {}", e))
            })?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::not_found("Patient", patient_id));
        };

        let record: PatientRecord = serde_json::from_value(row)
            .map_err(|e| SchedulingError::Dependency(format!("Unexpected patient row: {}", e)))?;

        info!("Patient {} status is now {}", record.id, record.status);
        Ok(())
    }
}

/// Directory kept in process memory. `fail_next` makes the next call fail
/// with a dependency error.
#[derive(Default)]
pub struct InMemoryPatientDirectory {
    statuses: RwLock<HashMap<(Uuid, Uuid), PatientStatus>>,
    fail_next: AtomicBool,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status_of(&self, clinic_id: Uuid, patient_id: Uuid) -> Option<PatientStatus> {
        self.statuses.read().await.get(&(clinic_id, patient_id)).copied()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PatientDirectory for InMemoryPatientDirectory {
    async fn set_status(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        status: PatientStatus,
    ) -> Result<(), SchedulingError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SchedulingError::Dependency("Patient directory unavailable".to_string()));
        }

        self.statuses.write().await.insert((clinic_id, patient_id), status);
        debug!("Patient {} status set to {}", patient_id, status);
        Ok(())
    }
}
