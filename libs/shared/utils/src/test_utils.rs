use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Identity;
use shared_models::appointment::Appointment;
use shared_models::availability::Availability;
use shared_models::lookup::{AppointmentStatusCode, VisitMode};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub suggestion_proximity_days: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            suggestion_proximity_days: 7,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            suggestion_proximity_days: self.suggestion_proximity_days,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// A clinic with one acting user.
pub struct TestClinic {
    pub clinic_id: Uuid,
    pub user_id: Uuid,
}

impl Default for TestClinic {
    fn default() -> Self {
        Self {
            clinic_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }
}

impl TestClinic {
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id, self.clinic_id)
    }

    /// Free slot row, ready to be seeded through a unit of work.
    pub fn availability(
        &self,
        staff_id: Uuid,
        appointment_type_id: i64,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Availability {
        let now = Utc::now();
        Availability {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id,
            staff_id,
            appointment_type_id,
            start_date: start,
            duration_minutes,
            end_date: start + Duration::minutes(duration_minutes as i64),
            is_occupied: false,
            created_at: now,
            created_by: self.user_id,
            updated_at: now,
            updated_by: self.user_id,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Appointment row of type 1 with a 30 minute period, staff assigned and
    /// no slot bound.
    pub fn appointment(
        &self,
        patient_id: Uuid,
        status: AppointmentStatusCode,
        start: DateTime<Utc>,
    ) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id,
            patient_id,
            staff_id: Some(Uuid::new_v4()),
            status,
            appointment_type_id: 1,
            visit_mode: VisitMode::InPerson,
            start_date: start,
            end_date: start + Duration::minutes(30),
            duration_minutes: 30,
            availability_id: None,
            previous_appointment_id: None,
            provisional_date: status.is_provisional().then_some(start),
            cancel_reschedule_reason_id: None,
            cancel_reschedule_text: None,
            upcoming_appointment: false,
            notes: None,
            canceled_at: None,
            canceled_by: None,
            actual_start_date: None,
            actual_end_date: None,
            visit_id: None,
            visit_summary_document_id: None,
            created_at: now,
            created_by: self.user_id,
            updated_at: now,
            updated_by: self.user_id,
            deleted_at: None,
            deleted_by: None,
        }
    }
}

/// `days` calendar days from today at `hour:minute` UTC.
pub fn days_from_now_at(days: i64, hour: u32, minute: u32) -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(days)).date_naive();
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn clinic_settings_row(clinic_id: Option<Uuid>, checkin_minutes: i64) -> serde_json::Value {
        json!({
            "clinic_id": clinic_id,
            "checkin_before_appt_minutes": checkin_minutes,
            "sec_not_confirmed_before_appt_hours": 24,
            "confirm_before_appt_hours": 72,
            "remind_before_appt_hours": 48,
            "appointment_request_enabled": true
        })
    }

    pub fn patient_row(patient_id: Uuid, clinic_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "clinic_id": clinic_id,
            "status": status
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
