use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::appointment::Appointment;
use shared_models::lookup::{AppointmentStatusCode, VisitMode};

fn default_visit_mode() -> VisitMode {
    VisitMode::InPerson
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Either `availability_id`, or the full set of start date, duration,
/// appointment type and staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub availability_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub appointment_type_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    #[serde(default = "default_visit_mode")]
    pub visit_mode: VisitMode,
    /// Defaults to `WAIT_LIST`.
    pub status: Option<AppointmentStatusCode>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn for_slot(patient_id: Uuid, availability_id: Uuid) -> Self {
        Self {
            patient_id,
            availability_id: Some(availability_id),
            staff_id: None,
            appointment_type_id: None,
            start_date: None,
            duration_minutes: None,
            visit_mode: VisitMode::InPerson,
            status: None,
            notes: None,
        }
    }

    pub fn with_status(mut self, status: AppointmentStatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

/// Status-preserving edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    pub duration_minutes: Option<i32>,
    pub appointment_type_id: Option<i64>,
    pub visit_mode: Option<VisitMode>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentRequest {
    pub appointment_id: Uuid,
    pub cancel_reason_id: i64,
    pub cancel_reason_text: Option<String>,
    #[serde(default)]
    pub keep_availability_slot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPatientAppointmentsRequest {
    pub patient_id: Uuid,
    pub cancel_reason_id: i64,
    pub cancel_reason_text: Option<String>,
    #[serde(default)]
    pub keep_availability_slot: bool,
    /// The appointment linked to this visit is left untouched.
    pub exclude_visit_id: Option<Uuid>,
}

/// Any of `availability_id`, `staff_id` or `start_date` moves the successor
/// to a new slot; otherwise it keeps the predecessor's time details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleAppointmentRequest {
    pub appointment_id: Uuid,
    pub reason_id: i64,
    pub reason_text: Option<String>,
    #[serde(default)]
    pub keep_availability_slot: bool,
    pub availability_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub appointment_type_id: Option<i64>,
    pub visit_mode: Option<VisitMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAppointmentRequest {
    pub appointment_id: Uuid,
    pub visit_id: Uuid,
    pub visit_summary_document_id: Option<Uuid>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdhocAppointmentRequest {
    pub patient_id: Uuid,
    #[serde(default = "default_visit_mode")]
    pub visit_mode: VisitMode,
    pub date: DateTime<Utc>,
    pub staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteVisitRequest {
    #[serde(flatten)]
    pub appointment: CompleteAppointmentRequest,
    /// Release the patient instead of booking a follow-up provisional.
    #[serde(default)]
    pub release_patient: bool,
    pub release_reason_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivatePatientRequest {
    pub patient_id: Uuid,
    pub appointment_type_id: i64,
    pub staff_id: Option<Uuid>,
    /// Defaults to now.
    pub start_date: Option<DateTime<Utc>>,
    /// Defaults to the appointment type's duration.
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitCompletion {
    pub completed: Appointment,
    /// Appointments released along with the patient.
    pub released: Vec<Appointment>,
    /// Follow-up provisional booked when the patient continues care.
    pub next_provisional: Option<Appointment>,
}
