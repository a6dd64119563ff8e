use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lookup::{AppointmentStatusCode, VisitMode};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub status: AppointmentStatusCode,
    pub appointment_type_id: i64,
    pub visit_mode: VisitMode,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub availability_id: Option<Uuid>,
    pub previous_appointment_id: Option<Uuid>,
    pub provisional_date: Option<DateTime<Utc>>,
    pub cancel_reschedule_reason_id: Option<i64>,
    pub cancel_reschedule_text: Option<String>,
    pub upcoming_appointment: bool,
    pub notes: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub canceled_by: Option<Uuid>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub visit_id: Option<Uuid>,
    pub visit_summary_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Appointment {
    pub fn is_provisional(&self) -> bool {
        self.status.is_provisional()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Set start and duration together so `end_date` stays consistent.
    pub fn set_period(&mut self, start: DateTime<Utc>, duration_minutes: i32) {
        self.start_date = start;
        self.duration_minutes = duration_minutes;
        self.end_date = start + Duration::minutes(duration_minutes as i64);
    }

    pub fn touch(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.updated_at = at;
        self.updated_by = by;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub appointment_id: Uuid,
    pub status: AppointmentStatusCode,
    pub previous_status: Option<AppointmentStatusCode>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// History row before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatusHistoryEntry {
    pub appointment_id: Uuid,
    pub status: AppointmentStatusCode,
    pub previous_status: Option<AppointmentStatusCode>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    #[default]
    Asc,
    Desc,
}
