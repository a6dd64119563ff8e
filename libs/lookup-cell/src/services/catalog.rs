use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

use shared_models::lookup::{
    AppointmentStatusCode, AppointmentTypeEntry, CancelReason, CancelReasonCode, ReasonCategory,
};
use shared_models::SchedulingError;

/// Appointment type used for walk-in (ad-hoc) visits.
pub const ADHOC_APPOINTMENT_TYPE_CODE: &str = "ADHOC";

/// Read-only lookup tables: status ids, appointment types and
/// cancel/reschedule reasons.
#[async_trait]
pub trait LookupCatalog: Send + Sync {
    async fn status_id_by_code(&self, code: AppointmentStatusCode) -> Result<i64, SchedulingError>;

    async fn status_code_by_id(&self, id: i64) -> Result<AppointmentStatusCode, SchedulingError>;

    async fn type_id_by_code(&self, code: &str) -> Result<i64, SchedulingError>;

    async fn appointment_type(&self, id: i64) -> Result<Option<AppointmentTypeEntry>, SchedulingError>;

    async fn reason(&self, id: i64) -> Result<Option<CancelReason>, SchedulingError>;

    async fn reason_by_code(&self, code: CancelReasonCode) -> Result<CancelReason, SchedulingError>;

    fn is_valid_transition(&self, from: AppointmentStatusCode, to: AppointmentStatusCode) -> bool {
        from.can_transition_to(to)
    }

    fn valid_transitions(&self, from: AppointmentStatusCode) -> Vec<AppointmentStatusCode> {
        from.allowed_transitions().to_vec()
    }
}

pub struct StaticLookupCatalog {
    statuses: Vec<(i64, AppointmentStatusCode)>,
    types: HashMap<i64, AppointmentTypeEntry>,
    reasons: HashMap<i64, CancelReason>,
    reachable: bool,
}

impl Default for StaticLookupCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

impl StaticLookupCatalog {
    pub fn new(types: Vec<AppointmentTypeEntry>, reasons: Vec<CancelReason>) -> Self {
        let statuses = AppointmentStatusCode::ALL
            .iter()
            .enumerate()
            .map(|(index, status)| (index as i64 + 1, *status))
            .collect();

        Self {
            statuses,
            types: types.into_iter().map(|entry| (entry.id, entry)).collect(),
            reasons: reasons.into_iter().map(|reason| (reason.id, reason)).collect(),
            reachable: true,
        }
    }

    /// Default clinic catalog.
    pub fn seeded() -> Self {
        let types = vec![
            appointment_type(1, "INITIAL_CONSULTATION", "Initial consultation", "Consultation initiale", 30),
            appointment_type(2, "FOLLOW_UP", "Follow-up", "Suivi", 20),
            appointment_type(3, "ANNUAL_CHECKUP", "Annual check-up", "Bilan annuel", 45),
            appointment_type(4, ADHOC_APPOINTMENT_TYPE_CODE, "Walk-in", "Sans rendez-vous", 0),
        ];

        let reasons = vec![
            reason(1, CancelReasonCode::PatientRequest, ReasonCategory::Cancel, "Patient request", "Demande du patient"),
            reason(2, CancelReasonCode::StaffUnavailable, ReasonCategory::Cancel, "Staff unavailable", "Personnel indisponible"),
            reason(3, CancelReasonCode::ClinicClosure, ReasonCategory::Cancel, "Clinic closure", "Fermeture de la clinique"),
            reason(4, CancelReasonCode::NoShow, ReasonCategory::Cancel, "No show", "Absence"),
            reason(5, CancelReasonCode::AdhocAppointment, ReasonCategory::Cancel, "Ad-hoc appointment initiated", "Rendez-vous sans préavis initié"),
            reason(6, CancelReasonCode::ReleasePatient, ReasonCategory::Cancel, "Patient released", "Patient congédié"),
            reason(7, CancelReasonCode::ReschedulePatientRequest, ReasonCategory::Reschedule, "Rescheduled at patient request", "Reporté à la demande du patient"),
            reason(8, CancelReasonCode::RescheduleStaffRequest, ReasonCategory::Reschedule, "Rescheduled by staff", "Reporté par le personnel"),
            reason(9, CancelReasonCode::Other, ReasonCategory::Cancel, "Other", "Autre"),
        ];

        Self::new(types, reasons)
    }

    /// Catalog whose every lookup fails as if the backing tables were down.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::seeded()
        }
    }

    fn ensure_reachable(&self) -> Result<(), SchedulingError> {
        if self.reachable {
            Ok(())
        } else {
            warn!("Lookup catalog is unreachable");
            Err(SchedulingError::Dependency("Lookup catalog unavailable".to_string()))
        }
    }
}

#[async_trait]
impl LookupCatalog for StaticLookupCatalog {
    async fn status_id_by_code(&self, code: AppointmentStatusCode) -> Result<i64, SchedulingError> {
        self.ensure_reachable()?;
        self.statuses
            .iter()
            .find(|(_, status)| *status == code)
            .map(|(id, _)| *id)
            .ok_or_else(|| SchedulingError::not_found("AppointmentStatus", code))
    }

    async fn status_code_by_id(&self, id: i64) -> Result<AppointmentStatusCode, SchedulingError> {
        self.ensure_reachable()?;
        self.statuses
            .iter()
            .find(|(status_id, _)| *status_id == id)
            .map(|(_, status)| *status)
            .ok_or_else(|| SchedulingError::not_found("AppointmentStatus", id))
    }

    async fn type_id_by_code(&self, code: &str) -> Result<i64, SchedulingError> {
        self.ensure_reachable()?;
        self.types
            .values()
            .find(|entry| entry.code == code)
            .map(|entry| entry.id)
            .ok_or_else(|| {
                SchedulingError::validation("appointmentTypeCode", format!("Unknown appointment type code {}", code))
            })
    }

    async fn appointment_type(&self, id: i64) -> Result<Option<AppointmentTypeEntry>, SchedulingError> {
        self.ensure_reachable()?;
        debug!("Looking up appointment type {}", id);
        Ok(self.types.get(&id).cloned())
    }

    async fn reason(&self, id: i64) -> Result<Option<CancelReason>, SchedulingError> {
        self.ensure_reachable()?;
        Ok(self.reasons.get(&id).cloned())
    }

    async fn reason_by_code(&self, code: CancelReasonCode) -> Result<CancelReason, SchedulingError> {
        self.ensure_reachable()?;
        self.reasons
            .values()
            .find(|reason| reason.code == code)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found("CancelReason", code))
    }
}

fn appointment_type(id: i64, code: &str, name_en: &str, name_fr: &str, minutes: i32) -> AppointmentTypeEntry {
    AppointmentTypeEntry {
        id,
        code: code.to_string(),
        name_en: name_en.to_string(),
        name_fr: name_fr.to_string(),
        default_duration_minutes: minutes,
    }
}

fn reason(
    id: i64,
    code: CancelReasonCode,
    category: ReasonCategory,
    name_en: &str,
    name_fr: &str,
) -> CancelReason {
    CancelReason {
        id,
        code,
        category,
        name_en: name_en.to_string(),
        name_fr: name_fr.to_string(),
    }
}
