use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::appointment::Appointment;
use crate::lookup::AppointmentStatusCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    AppointmentSetProvisional,
    AppointmentScheduled,
    AppointmentUpdated,
    AppointmentRescheduled,
    AppointmentCanceled,
    AppointmentReminder,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::AppointmentSetProvisional => "APPOINTMENT_SET_PROVISIONAL",
            EventName::AppointmentScheduled => "APPOINTMENT_SCHEDULED",
            EventName::AppointmentUpdated => "APPOINTMENT_UPDATED",
            EventName::AppointmentRescheduled => "APPOINTMENT_RESCHEDULED",
            EventName::AppointmentCanceled => "APPOINTMENT_CANCELED",
            EventName::AppointmentReminder => "APPOINTMENT_REMINDER",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusProjection {
    pub code: AppointmentStatusCode,
    pub name_en: String,
    pub name_fr: String,
}

impl From<AppointmentStatusCode> for StatusProjection {
    fn from(status: AppointmentStatusCode) -> Self {
        Self {
            code: status,
            name_en: status.name_en().to_string(),
            name_fr: status.name_fr().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentProjection {
    pub appointment_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub appointment_status: StatusProjection,
    pub appointment_date_time: DateTime<Utc>,
}

impl From<&Appointment> for AppointmentProjection {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            staff_id: appointment.staff_id,
            appointment_status: appointment.status.into(),
            appointment_date_time: appointment.start_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEventPayload {
    pub event_name: EventName,
    pub change_type: String,
    pub source: String,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub triggering_user_id: Uuid,
    pub doctors_affected: Vec<Uuid>,
    pub appointments_affected: Vec<Uuid>,
    pub appointment: AppointmentProjection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_appointment: Option<AppointmentProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_before_update: Option<AppointmentProjection>,
}

impl AppointmentEventPayload {
    pub fn new(
        event_name: EventName,
        source: &str,
        triggering_user_id: Uuid,
        appointment: &Appointment,
    ) -> Self {
        Self {
            event_name,
            change_type: "Appointment".to_string(),
            source: source.to_string(),
            clinic_id: appointment.clinic_id,
            patient_id: appointment.patient_id,
            triggering_user_id,
            doctors_affected: appointment.staff_id.into_iter().collect(),
            appointments_affected: vec![appointment.id],
            appointment: appointment.into(),
            previous_appointment: None,
            appointment_before_update: None,
        }
    }

    pub fn with_previous(mut self, previous: &Appointment) -> Self {
        if let Some(staff_id) = previous.staff_id {
            if !self.doctors_affected.contains(&staff_id) {
                self.doctors_affected.push(staff_id);
            }
        }
        self.appointments_affected.push(previous.id);
        self.previous_appointment = Some(previous.into());
        self
    }

    pub fn with_before_update(mut self, before: &Appointment) -> Self {
        self.appointment_before_update = Some(before.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedAppointment {
    pub appointment_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub appointment_date_time: DateTime<Utc>,
}

/// Fired when a notification job comes due. `meta_data` is flattened into
/// the top level of the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEventPayload {
    pub event_name: String,
    pub source: String,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub appointment: NotifiedAppointment,
    #[serde(flatten)]
    pub meta_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event bus unavailable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::VisitMode;

    fn appointment(staff_id: Option<Uuid>) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            staff_id,
            status: AppointmentStatusCode::Schedule,
            appointment_type_id: 1,
            visit_mode: VisitMode::InPerson,
            start_date: now,
            end_date: now,
            duration_minutes: 0,
            availability_id: None,
            previous_appointment_id: None,
            provisional_date: None,
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
            created_by: Uuid::nil(),
            updated_at: now,
            updated_by: Uuid::nil(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let current = appointment(Some(Uuid::new_v4()));
        let previous = appointment(Some(Uuid::new_v4()));
        let payload = AppointmentEventPayload::new(
            EventName::AppointmentRescheduled,
            "appointment-service",
            Uuid::new_v4(),
            &current,
        )
        .with_previous(&previous);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["eventName"], "APPOINTMENT_RESCHEDULED");
        assert_eq!(json["changeType"], "Appointment");
        assert_eq!(json["appointment"]["appointmentStatus"]["code"], "SCHEDULE");
        assert!(json.get("appointmentBeforeUpdate").is_none());
        assert_eq!(json["doctorsAffected"].as_array().unwrap().len(), 2);
        assert_eq!(json["appointmentsAffected"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn notification_payload_flattens_meta_data() {
        let mut meta = serde_json::Map::new();
        meta.insert("leadTimeMinutes".into(), serde_json::json!(30));
        let payload = NotificationEventPayload {
            event_name: "APPOINTMENT_CHECKIN_REQUEST".into(),
            source: "appointment-service".into(),
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            appointment: NotifiedAppointment {
                appointment_id: Uuid::new_v4(),
                staff_id: None,
                appointment_date_time: Utc::now(),
            },
            meta_data: meta,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["leadTimeMinutes"], 30);
        assert_eq!(json["eventName"], "APPOINTMENT_CHECKIN_REQUEST");
    }
}
