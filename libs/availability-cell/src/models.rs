use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::lookup::TimeGroup;

/// Maximum number of slots returned by a suggestion query.
pub const MAX_SUGGESTIONS: usize = 9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAvailabilityRequest {
    pub staff_id: Uuid,
    pub appointment_type_id: i64,
    pub start_date: DateTime<Utc>,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailabilityRequest {
    pub id: Uuid,
    pub staff_id: Option<Uuid>,
    pub appointment_type_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAvailabilityAction {
    #[serde(default)]
    pub create: Vec<CreateAvailabilityRequest>,
    #[serde(default)]
    pub update: Vec<UpdateAvailabilityRequest>,
    #[serde(default)]
    pub remove: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAvailabilityResult {
    pub created: Vec<shared_models::availability::Availability>,
    pub updated: Vec<shared_models::availability::Availability>,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub patient_id: Uuid,
    pub staff_ids: Option<Vec<Uuid>>,
    pub appointment_type_id: i64,
    pub reference_date: DateTime<Utc>,
    pub time_group: TimeGroup,
}

/// Slot created on the fly for an appointment booked without one.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub staff_id: Uuid,
    pub appointment_type_id: i64,
    pub start_date: DateTime<Utc>,
    pub duration_minutes: i32,
}
