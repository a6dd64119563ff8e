use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::lookup::PatientStatus;

/// The slice of the patient record the scheduling core reads back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub status: PatientStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientStatusUpdate {
    pub status: PatientStatus,
    pub updated_at: DateTime<Utc>,
}
